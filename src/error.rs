use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while resolving, building, executing or post-processing
/// a metric query.
///
/// Validation variants (`UnsupportedChain`, `UnsupportedResolution`,
/// `InvalidDateRange`, `InvalidIdentifier`) are always raised before any
/// SQL reaches the warehouse.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("unsupported chain '{0}'")]
    UnsupportedChain(String),

    #[error("unsupported resolution '{resolution}' for metric '{metric}'")]
    UnsupportedResolution { metric: String, resolution: String },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("query execution failed: {message}")]
    QueryExecution {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    #[error("column '{column}' has unsupported type '{type_name}'")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("column '{0}' not found in result table")]
    MissingColumn(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl QueryError {
    /// Wrap a driver or pool error, keeping it as the source.
    pub fn execution<E>(context: impl Display, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::QueryExecution {
            message: format!("{context}: {err}"),
            source: Some(Arc::new(err)),
        }
    }

    /// Copy of an error handed out behind an `Arc`, as the cache does for
    /// every waiter of a failed load.
    pub fn from_shared(err: Arc<QueryError>) -> Self {
        (*err).clone()
    }

    /// True for errors raised before anything was sent to the warehouse.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedChain(_)
                | Self::UnsupportedResolution { .. }
                | Self::InvalidDateRange { .. }
                | Self::InvalidIdentifier(_)
        )
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_from_shared_keeps_variant_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let shared = Arc::new(QueryError::execution("Failed to acquire warehouse connection", io));
        let held_elsewhere = Arc::clone(&shared);

        let err = QueryError::from_shared(shared);
        assert!(matches!(
            err,
            QueryError::QueryExecution { ref message, .. }
                if message == "Failed to acquire warehouse connection: refused"
        ));
        assert!(err.source().is_some());
        assert!(!err.is_validation());
        drop(held_elsewhere);
    }
}
