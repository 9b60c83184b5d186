//! Metric query construction.
//!
//! - [`chain`] - Chain registry and selectors
//! - [`resolution`] - Time buckets and APR windows
//! - [`date_range`] - Inclusive date windows and presets
//! - [`metric`] - Catalog of warehouse metrics
//! - [`resolver`] - Request validation and chain resolution
//! - [`builder`] - Per-chain `UNION ALL` statement construction

pub mod builder;
pub mod chain;
pub mod date_range;
pub mod metric;
pub mod resolution;
pub mod resolver;

pub use builder::{Query, QueryParam, UnionQueryBuilder};
pub use chain::{Chain, ChainSelector, CHAINS};
pub use date_range::{DateRange, DateRangePreset};
pub use metric::{Metric, MetricQuerySpec};
pub use resolution::Resolution;
pub use resolver::{resolve, resolve_str, MetricRequest, ResolvedQuery};
