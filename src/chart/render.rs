use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate;
use crate::chart::format::ValueFormat;
use crate::error::Result;
use crate::table::{ResultTable, Value, ValueKey};

/// Legend rank of the aggregate trace, below every grouped series.
const CUSTOM_AGG_LEGEND_RANK: i64 = -1000;

/// Default stack group for area and line charts.
const DEFAULT_STACK_GROUP: &str = "one";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Bar,
    Scatter,
}

/// Extra trace summing one field across all groups per x value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomAggregate {
    pub field: String,
    pub name: String,
}

impl CustomAggregate {
    pub fn sum(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            name: "Total".to_string(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Declarative chart description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x: String,
    pub y: Vec<String>,
    pub color_by: Option<String>,
    pub y_format: ValueFormat,
    pub x_format: ValueFormat,
    pub smooth: bool,
    pub sort_by_last_value: bool,
    pub sort_ascending: bool,
    pub human_format: bool,
    pub custom_agg: Option<CustomAggregate>,
    pub stack_group: Option<String>,
    pub help_text: Option<String>,
    /// Horizontal bars
    pub column: bool,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, title: impl Into<String>, x: &str, y: &[&str]) -> Self {
        Self {
            kind,
            title: title.into(),
            x: x.to_string(),
            y: y.iter().map(ToString::to_string).collect(),
            color_by: None,
            y_format: ValueFormat::Currency,
            x_format: ValueFormat::Count,
            smooth: false,
            sort_by_last_value: false,
            sort_ascending: false,
            human_format: false,
            custom_agg: None,
            stack_group: match kind {
                ChartKind::Area | ChartKind::Line => Some(DEFAULT_STACK_GROUP.to_string()),
                ChartKind::Bar => None,
            },
            help_text: None,
            column: false,
        }
    }

    pub fn bar(title: impl Into<String>, x: &str, y: &[&str]) -> Self {
        Self::new(ChartKind::Bar, title, x, y)
    }

    pub fn line(title: impl Into<String>, x: &str, y: &[&str]) -> Self {
        Self::new(ChartKind::Line, title, x, y)
    }

    pub fn area(title: impl Into<String>, x: &str, y: &[&str]) -> Self {
        Self::new(ChartKind::Area, title, x, y)
    }

    pub fn color_by(mut self, column: &str) -> Self {
        self.color_by = Some(column.to_string());
        self
    }

    pub fn y_format(mut self, format: ValueFormat) -> Self {
        self.y_format = format;
        self
    }

    pub fn smooth(mut self) -> Self {
        self.smooth = true;
        self
    }

    pub fn sort_by_last_value(mut self, ascending: bool) -> Self {
        self.sort_by_last_value = true;
        self.sort_ascending = ascending;
        self
    }

    pub fn human_format(mut self) -> Self {
        self.human_format = true;
        self
    }

    pub fn custom_agg(mut self, agg: CustomAggregate) -> Self {
        self.custom_agg = Some(agg);
        self
    }

    /// Draw every series from zero instead of stacking them.
    pub fn unstacked(mut self) -> Self {
        self.stack_group = None;
        self
    }

    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = Some(text.into());
        self
    }
}

/// One trace of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub trace: TraceKind,
    pub x: Vec<Value>,
    pub y: Vec<Option<f64>>,
    pub hover_text: Vec<String>,
    pub legend_rank: i64,
    pub show_legend: bool,
    pub stack_group: Option<String>,
    pub line_width: u32,
}

impl Series {
    pub fn last_value(&self) -> Option<f64> {
        self.y.last().copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub tick_prefix: Option<&'static str>,
    pub tick_format: Option<&'static str>,
}

impl From<ValueFormat> for Axis {
    fn from(format: ValueFormat) -> Self {
        Self {
            tick_prefix: format.tick_prefix(),
            tick_format: format.tick_format(),
        }
    }
}

/// Renderable chart, serializable for a front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub kind: ChartKind,
    pub series: Vec<Series>,
    pub x_axis: Axis,
    pub y_axis: Axis,
    /// `x unified` for vertical charts, `y unified` for horizontal
    pub hover_mode: &'static str,
    /// `hv` step lines unless smoothing was requested
    pub line_shape: Option<&'static str>,
    pub bar_mode: Option<&'static str>,
    pub help_text: Option<String>,
}

/// Build a chart from a table.
///
/// With `color_by`, one series per distinct group value in sorted key order;
/// otherwise one series per y column. Sorting by last value is stable, so
/// ties keep that order; series without a last value go last.
pub fn render(table: &ResultTable, spec: &ChartSpec) -> Result<Chart> {
    let x_index = table.column_index(&spec.x)?;
    let y_indices = spec
        .y
        .iter()
        .map(|name| table.column_index(name))
        .collect::<Result<Vec<_>>>()?;

    let trace = match spec.kind {
        ChartKind::Bar => TraceKind::Bar,
        ChartKind::Line | ChartKind::Area => TraceKind::Scatter,
    };

    let mut series = match &spec.color_by {
        Some(color_by) => {
            let group_index = table.column_index(color_by)?;
            let mut groups: BTreeMap<ValueKey, (String, Vec<&Vec<Value>>)> = BTreeMap::new();
            for row in table.rows() {
                groups
                    .entry(row[group_index].key())
                    .or_insert_with(|| (row[group_index].to_string(), Vec::new()))
                    .1
                    .push(row);
            }

            let mut series = Vec::new();
            for (label, rows) in groups.into_values() {
                for (y_name, &y_index) in spec.y.iter().zip(&y_indices) {
                    let name = if spec.y.len() > 1 {
                        format!("{label} - {y_name}")
                    } else {
                        label.clone()
                    };
                    series.push(build_series(spec, trace, name, &rows, x_index, y_index));
                }
            }
            series
        },
        None => {
            let rows: Vec<&Vec<Value>> = table.rows().iter().collect();
            spec.y
                .iter()
                .zip(&y_indices)
                .map(|(y_name, &y_index)| {
                    build_series(spec, trace, y_name.clone(), &rows, x_index, y_index)
                })
                .collect()
        },
    };

    if spec.sort_by_last_value {
        series.sort_by(|a, b| compare_last_values(a, b, spec.sort_ascending));
    }
    for (rank, s) in series.iter_mut().enumerate() {
        s.legend_rank = -(rank as i64);
    }

    if let Some(agg) = &spec.custom_agg {
        // Optional trace: skipped when the field is absent or nothing sums
        if table.has_column(&agg.field) {
            series.extend(custom_agg_series(table, spec, agg)?);
        }
    }

    let horizontal = spec.column;
    Ok(Chart {
        title: spec.title.clone(),
        kind: spec.kind,
        series,
        x_axis: spec.x_format.into(),
        y_axis: spec.y_format.into(),
        hover_mode: if horizontal { "y unified" } else { "x unified" },
        line_shape: match spec.kind {
            ChartKind::Line if !spec.smooth => Some("hv"),
            _ => None,
        },
        bar_mode: match spec.kind {
            ChartKind::Bar => Some("relative"),
            _ => None,
        },
        help_text: spec.help_text.clone(),
    })
}

fn build_series(
    spec: &ChartSpec,
    trace: TraceKind,
    name: String,
    rows: &[&Vec<Value>],
    x_index: usize,
    y_index: usize,
) -> Series {
    let x: Vec<Value> = rows.iter().map(|row| row[x_index].clone()).collect();
    let y: Vec<Option<f64>> = rows.iter().map(|row| row[y_index].as_f64()).collect();
    let hover_text = y
        .iter()
        .map(|value| hover_text(spec, &name, *value))
        .collect();

    Series {
        name,
        trace,
        x,
        y,
        hover_text,
        legend_rank: 0,
        show_legend: true,
        stack_group: spec.stack_group.clone(),
        line_width: 2,
    }
}

fn custom_agg_series(
    table: &ResultTable,
    spec: &ChartSpec,
    agg: &CustomAggregate,
) -> Result<Option<Series>> {
    let totals = aggregate::sum_by(table, &spec.x, &[], &[agg.field.as_str()])?;
    if totals.is_empty() {
        return Ok(None);
    }

    let x: Vec<Value> = totals.rows().iter().map(|row| row[0].clone()).collect();
    let y: Vec<Option<f64>> = totals.rows().iter().map(|row| row[1].as_f64()).collect();
    let hover_text = y
        .iter()
        .map(|value| hover_text(spec, &agg.name, *value))
        .collect();

    Ok(Some(Series {
        name: agg.name.clone(),
        trace: TraceKind::Scatter,
        x,
        y,
        hover_text,
        legend_rank: CUSTOM_AGG_LEGEND_RANK,
        show_legend: false,
        stack_group: None,
        line_width: 0,
    }))
}

fn hover_text(spec: &ChartSpec, name: &str, value: Option<f64>) -> String {
    match value {
        Some(v) => format!(
            "{name}: {}{}",
            spec.y_format.hover_prefix(),
            spec.y_format.format(v, spec.human_format)
        ),
        None => format!("{name}: -"),
    }
}

fn compare_last_values(a: &Series, b: &Series, ascending: bool) -> Ordering {
    match (a.last_value(), b.last_value()) {
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
