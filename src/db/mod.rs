//! Warehouse access.
//!
//! The [`QueryExecutor`] trait is the seam between query construction and
//! the database: [`PostgresClient`] is the production implementation, tests
//! substitute a canned executor.

use std::future::Future;

use crate::error::Result;
use crate::query::Query;
use crate::table::ResultTable;

pub mod postgres;

pub use postgres::PostgresClient;

/// Runs one built statement and returns its rows as a table.
///
/// Implementations perform a single round-trip, do not retry and do not
/// cache. A statement returning no rows still yields its column shape.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &Query) -> impl Future<Output = Result<ResultTable>> + Send;
}

#[cfg(test)]
pub(crate) mod testing;
