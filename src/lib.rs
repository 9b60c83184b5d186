pub mod aggregate;
pub mod api;
pub mod benchmark;
pub mod cache;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod table;

pub use api::{AccountActivity, CoreStats, CrossChainStats, PerpsStats, StatsApi};
pub use cache::QueryCache;
pub use config::Settings;
pub use db::{PostgresClient, QueryExecutor};
pub use error::{QueryError, Result};
pub use table::ResultTable;
