//! Client-side aggregation of result tables.
//!
//! Used where the warehouse cannot pre-aggregate, mostly cross-chain totals
//! built from per-chain rows and views that mix tables from different
//! protocol versions.

use rustc_hash::FxHashMap;

use crate::error::{QueryError, Result};
use crate::table::{Column, ColumnKind, ResultTable, Value, ValueKey};

/// Sum `value_cols` over rows sharing `(ts_col, group_cols...)`.
///
/// Nulls are skipped rather than propagated; a group whose values are all
/// null stays null. Every distinct group present in the input is kept.
/// Output rows are ordered by timestamp, ties keeping first-seen order.
pub fn sum_by(
    table: &ResultTable,
    ts_col: &str,
    group_cols: &[&str],
    value_cols: &[&str],
) -> Result<ResultTable> {
    let ts_index = table.column_index(ts_col)?;
    let group_indices = group_cols
        .iter()
        .map(|name| table.column_index(name))
        .collect::<Result<Vec<_>>>()?;
    let value_indices = value_cols
        .iter()
        .map(|name| {
            let index = table.column_index(name)?;
            let kind = table.columns()[index].kind;
            if !kind.is_numeric() {
                return Err(QueryError::UnsupportedColumnType {
                    column: name.to_string(),
                    type_name: format!("{kind:?}"),
                });
            }
            Ok(index)
        })
        .collect::<Result<Vec<_>>>()?;

    let key_indices: Vec<usize> = std::iter::once(ts_index)
        .chain(group_indices.iter().copied())
        .collect();

    let mut columns: Vec<Column> = key_indices
        .iter()
        .map(|&i| table.columns()[i].clone())
        .collect();
    columns.extend(value_indices.iter().map(|&i| table.columns()[i].clone()));

    let mut positions: FxHashMap<Vec<ValueKey>, usize> = FxHashMap::default();
    let mut groups: Vec<(Vec<Value>, Vec<Option<f64>>)> = Vec::new();

    for row in table.rows() {
        let key: Vec<ValueKey> = key_indices.iter().map(|&i| row[i].key()).collect();
        let position = *positions.entry(key).or_insert_with(|| {
            groups.push((
                key_indices.iter().map(|&i| row[i].clone()).collect(),
                vec![None; value_indices.len()],
            ));
            groups.len() - 1
        });

        let sums = &mut groups[position].1;
        for (sum, &i) in sums.iter_mut().zip(&value_indices) {
            if let Some(v) = row[i].as_f64() {
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
        }
    }

    // Stable: equal timestamps keep first-seen order
    groups.sort_by(|(a, _), (b, _)| a[0].key().cmp(&b[0].key()));

    let value_kinds: Vec<ColumnKind> = value_indices
        .iter()
        .map(|&i| table.columns()[i].kind)
        .collect();

    let rows = groups
        .into_iter()
        .map(|(mut keys, sums)| {
            keys.extend(sums.into_iter().zip(&value_kinds).map(|(sum, kind)| {
                match (sum, kind) {
                    (None, _) => Value::Null,
                    (Some(v), ColumnKind::Integer) => Value::Int(v.round() as i64),
                    (Some(v), _) => Value::Float(v),
                }
            }));
            keys
        })
        .collect();

    Ok(ResultTable::new(columns, rows))
}

/// Stack tables vertically, aligning columns by name.
///
/// The output has every column seen, in first-seen order; cells for columns
/// a table lacks are null.
pub fn concat(tables: &[&ResultTable]) -> ResultTable {
    let mut columns: Vec<Column> = Vec::new();
    for table in tables {
        for column in table.columns() {
            if !columns.iter().any(|c| c.name == column.name) {
                columns.push(column.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(tables.iter().map(|t| t.len()).sum());
    for table in tables {
        let mapping: Vec<Option<usize>> = columns
            .iter()
            .map(|c| table.column_index(&c.name).ok())
            .collect();
        for row in table.rows() {
            rows.push(
                mapping
                    .iter()
                    .map(|index| index.map_or(Value::Null, |i| row[i].clone()))
                    .collect(),
            );
        }
    }

    ResultTable::new(columns, rows)
}
