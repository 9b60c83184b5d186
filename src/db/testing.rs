use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::db::QueryExecutor;
use crate::error::{QueryError, Result};
use crate::query::{DateRange, Metric, Query, QueryParam};
use crate::table::ResultTable;

/// Executor returning canned tables per metric and recording every statement.
///
/// Canned rows are filtered to the statement's bound `[$1, $2]` window on
/// `ts`, as the warehouse would. Metrics without a canned table answer with a
/// zero-row table of the statement's shape.
#[derive(Default)]
pub(crate) struct StaticExecutor {
    tables: FxHashMap<&'static str, ResultTable>,
    failing: FxHashSet<&'static str>,
    issued: Mutex<Vec<Query>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, metric: Metric, table: ResultTable) -> Self {
        self.tables.insert(metric.name(), table);
        self
    }

    pub fn failing(mut self, metric: Metric) -> Self {
        self.failing.insert(metric.name());
        self
    }

    /// Hold every statement open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Most statements ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> Vec<Query> {
        self.issued.lock().unwrap().clone()
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().unwrap().len()
    }
}

impl QueryExecutor for StaticExecutor {
    async fn execute(&self, query: &Query) -> Result<ResultTable> {
        self.issued.lock().unwrap().push(query.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(query.name) {
            return Err(QueryError::QueryExecution {
                message: format!("relation for {} does not exist", query.name),
                source: None,
            });
        }

        let Some(table) = self.tables.get(query.name) else {
            return Ok(query.empty_table());
        };

        match (bound_range(query), table.column_index("ts")) {
            (Some(range), Ok(ts)) => Ok(table.filter(|row| {
                row[ts].as_timestamp().is_some_and(|value| range.contains(value))
            })),
            _ => Ok(table.clone()),
        }
    }
}

fn bound_range(query: &Query) -> Option<DateRange> {
    match query.params.as_slice() {
        [QueryParam::Timestamp(start), QueryParam::Timestamp(end)] => {
            DateRange::new(*start, *end).ok()
        },
        _ => None,
    }
}
