//! Chart construction from result tables.
//!
//! Output is a plain serializable description of traces and axes; drawing is
//! left to whichever front end consumes it.

mod format;
mod render;

pub use format::{human_format, ValueFormat};
pub use render::{
    render, Axis, Chart, ChartKind, ChartSpec, CustomAggregate, Series, TraceKind,
};
