use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, error};
use tokio_postgres::types::Type;
use tokio_postgres::Row;

use crate::db::postgres::PostgresClient;
use crate::db::QueryExecutor;
use crate::error::{QueryError, Result};
use crate::query::Query;
use crate::table::{Column, ColumnKind, ResultTable, Value};

impl QueryExecutor for PostgresClient {
    async fn execute(&self, query: &Query) -> Result<ResultTable> {
        let started = Instant::now();

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| QueryError::execution("Failed to acquire warehouse connection", e))?;

        // Prepared so the column shape is known even without rows
        let stmt = client.prepare(&query.sql).await.map_err(|e| {
            error!("Failed to prepare {} query: {:#}", query.name, e);
            QueryError::execution(format!("Failed to prepare {} query", query.name), e)
        })?;

        let columns = stmt
            .columns()
            .iter()
            .map(|c| Ok(Column::new(c.name(), column_kind(c.name(), c.type_())?)))
            .collect::<Result<Vec<_>>>()?;

        let rows = client.query(&stmt, &query.sql_params()).await.map_err(|e| {
            error!("Failed to execute {} query: {:#}", query.name, e);
            QueryError::execution(format!("Failed to execute {} query", query.name), e)
        })?;

        let rows = rows
            .iter()
            .map(|row| decode_row(row, &columns))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Executed {} query: {} rows in {:?}",
            query.name,
            rows.len(),
            started.elapsed()
        );

        Ok(ResultTable::new(columns, rows))
    }
}

/// Map a warehouse column type onto the value model.
pub(crate) fn column_kind(column: &str, ty: &Type) -> Result<ColumnKind> {
    let kind = match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => ColumnKind::Integer,
        Type::FLOAT4 | Type::FLOAT8 => ColumnKind::Float,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ColumnKind::Text,
        Type::BOOL => ColumnKind::Bool,
        Type::TIMESTAMPTZ | Type::TIMESTAMP | Type::DATE => ColumnKind::Timestamp,
        _ => {
            return Err(QueryError::UnsupportedColumnType {
                column: column.to_string(),
                type_name: ty.name().to_string(),
            })
        },
    };
    Ok(kind)
}

fn decode_row(row: &Row, columns: &[Column]) -> Result<Vec<Value>> {
    row.columns()
        .iter()
        .zip(columns)
        .enumerate()
        .map(|(idx, (pg_column, column))| decode_value(row, idx, pg_column.type_(), &column.name))
        .collect()
}

fn decode_value(row: &Row, idx: usize, ty: &Type, column: &str) -> Result<Value> {
    let decode_err = |e: tokio_postgres::Error| {
        QueryError::execution(format!("Failed to decode column {column}"), e)
    };

    let value: Value = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map_err(decode_err)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map_err(decode_err)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(decode_err)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map_err(decode_err)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(decode_err)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx).map_err(decode_err)?.into()
        },
        Type::BOOL => match row.try_get::<_, Option<bool>>(idx).map_err(decode_err)? {
            Some(b) => Value::Bool(b),
            None => Value::Null,
        },
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx).map_err(decode_err)?.into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(decode_err)?
            .map(|ts| ts.and_utc())
            .into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(decode_err)?
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|ts| ts.and_utc())
            .into(),
        _ => {
            return Err(QueryError::UnsupportedColumnType {
                column: column.to_string(),
                type_name: ty.name().to_string(),
            })
        },
    };
    Ok(value)
}
