//! Process-wide memoization of query results.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use moka::future::Cache;
use serde::Serialize;

use crate::config::CacheSettings;
use crate::error::{QueryError, Result};
use crate::table::ResultTable;

/// Identity of one memoized call: function name plus its serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub function: &'static str,
    pub args: String,
}

impl CacheKey {
    /// Arguments are serialized to JSON so equal requests share an entry.
    pub fn new<A: Serialize>(function: &'static str, args: &A) -> Self {
        let args = serde_json::to_string(args).unwrap_or_else(|e| {
            // Unique fallback so unserializable args never collide
            format!("<unserializable:{e}>:{:p}", args)
        });
        Self { function, args }
    }
}

/// TTL cache of result tables, owned by the caller and shared by reference.
///
/// Entries expire only by age or capacity eviction. Concurrent misses on the
/// same key run the loader once; a failing loader caches nothing.
#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<CacheKey, Arc<ResultTable>>,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { entries }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.ttl(), settings.max_capacity)
    }

    /// Cached table for `key`, running `load` on a miss.
    pub async fn get_or_try_insert_with<F>(&self, key: CacheKey, load: F) -> Result<Arc<ResultTable>>
    where
        F: Future<Output = Result<ResultTable>>,
    {
        if self.entries.contains_key(&key) {
            debug!("Cache hit for {}({})", key.function, key.args);
        } else {
            debug!("Cache miss for {}({})", key.function, key.args);
        }

        self.entries
            .try_get_with(key, async move { load.await.map(Arc::new) })
            .await
            .map_err(QueryError::from_shared)
    }

    pub async fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::table::{Column, ColumnKind, Value};

    fn table(v: f64) -> ResultTable {
        ResultTable::new(
            vec![Column::new("tvl", ColumnKind::Float)],
            vec![vec![Value::Float(v)]],
        )
    }

    #[tokio::test]
    async fn test_hit_skips_loader() {
        let cache = QueryCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("fetch", &("perps_stats", "base_mainnet"));

        for _ in 0..3 {
            let result = cache
                .get_or_try_insert_with(key.clone(), async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(table(1.0))
                })
                .await
                .unwrap();
            assert_eq!(*result, table(1.0));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_args_are_distinct_entries() {
        let cache = QueryCache::new(Duration::from_secs(60), 100);
        let base = CacheKey::new("fetch", &("perps_stats", "base_mainnet"));
        let arb = CacheKey::new("fetch", &("perps_stats", "arbitrum_mainnet"));
        assert_ne!(base, arb);

        cache.get_or_try_insert_with(base, async { Ok(table(1.0)) }).await.unwrap();
        let result = cache.get_or_try_insert_with(arb, async { Ok(table(2.0)) }).await.unwrap();
        assert_eq!(*result, table(2.0));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(60), 100);
        let key = CacheKey::new("fetch", &"core_stats");

        let err = cache
            .get_or_try_insert_with(key.clone(), async {
                Err(QueryError::QueryExecution {
                    message: "connection refused".to_string(),
                    source: None,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::QueryExecution { .. }));

        let result = cache
            .get_or_try_insert_with(key, async { Ok(table(3.0)) })
            .await
            .unwrap();
        assert_eq!(*result, table(3.0));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_the_load_error() {
        let cache = QueryCache::new(Duration::from_secs(60), 100);
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("fetch", &"perps_stats");

        let calls = &calls;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            Err(QueryError::execution("Query perps_stats failed", refused))
        };
        let (first, second) = tokio::join!(
            cache.get_or_try_insert_with(key.clone(), load()),
            cache.get_or_try_insert_with(key, load()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for err in [first.unwrap_err(), second.unwrap_err()] {
            assert!(matches!(err, QueryError::QueryExecution { ref message, .. }
                if message == "Query perps_stats failed: refused"));
            assert!(std::error::Error::source(&err).is_some());
        }
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = QueryCache::new(Duration::from_millis(50), 100);
        let key = CacheKey::new("fetch", &"core_stats");

        cache.get_or_try_insert_with(key.clone(), async { Ok(table(1.0)) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = cache
            .get_or_try_insert_with(key, async { Ok(table(2.0)) })
            .await
            .unwrap();
        assert_eq!(*result, table(2.0));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = QueryCache::new(Duration::from_secs(60), 100);
        cache
            .get_or_try_insert_with(CacheKey::new("fetch", &1), async { Ok(table(1.0)) })
            .await
            .unwrap();
        cache.invalidate_all().await;
        assert_eq!(cache.entry_count().await, 0);
    }
}
