//! Tabular query results.
//!
//! A [`ResultTable`] is produced by the executor and consumed by the
//! aggregator, chart renderer and CSV export. Every stage builds a new table;
//! nothing mutates a table it was handed.

mod export;
mod value;

use serde::Serialize;

use crate::error::{QueryError, Result};

pub use export::EXPORT_FILE_NAME;
pub use value::{ColumnKind, OrderedFloat, Value, ValueKey};

/// Named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered rows with named, typed columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Zero-row table with the given shape.
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Rows shorter than the column list are padded with nulls, longer ones
    /// truncated, so every row matches the shape.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| QueryError::MissingColumn(name.to_string()))
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[index]))
    }

    /// New table with only the rows matching `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        }
    }

    /// New table with only the rows whose `column` equals `value`.
    pub fn filter_eq(&self, column: &str, value: &Value) -> Result<Self> {
        let index = self.column_index(column)?;
        Ok(self.filter(|row| &row[index] == value))
    }
}
