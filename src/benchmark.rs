//! Warehouse query timing report.
//!
//! Every catalog metric is run against each chain it supports over 1, 7 and
//! 30 day windows, `runs` times per scenario, bypassing the cache.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::api::StatsApi;
use crate::db::QueryExecutor;
use crate::query::{Chain, ChainSelector, DateRange, Metric, MetricRequest, CHAINS};

/// Look-back windows, in days.
pub const WINDOWS_DAYS: [i64; 3] = [1, 7, 30];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub metric: Metric,
    pub chain: Chain,
    pub window_days: i64,
    pub range: DateRange,
}

impl Scenario {
    pub fn request(&self) -> MetricRequest {
        MetricRequest::new(self.metric, ChainSelector::One(self.chain), self.range)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}d", self.metric, self.chain, self.window_days)
    }
}

/// All scenarios for windows ending at `now`, in catalog then registry order.
pub fn scenarios(now: DateTime<Utc>) -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    for &metric in Metric::ALL {
        for window_days in WINDOWS_DAYS {
            let range = DateRange {
                start: now - chrono::Duration::days(window_days),
                end: now,
            };
            for chain in CHAINS.iter().filter(|c| metric.spec().supports_chain(c)) {
                scenarios.push(Scenario {
                    metric,
                    chain: *chain,
                    window_days,
                    range,
                });
            }
        }
    }
    scenarios
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl TimingStats {
    /// `None` without samples.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let min = samples.iter().min().copied()?;
        let max = samples.iter().max().copied()?;
        let total: Duration = samples.iter().sum();
        Some(Self {
            avg: total / samples.len() as u32,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub timings: Vec<Duration>,
    pub errors: Vec<String>,
}

impl ScenarioResult {
    pub fn runs(&self) -> usize {
        self.timings.len() + self.errors.len()
    }

    pub fn stats(&self) -> Option<TimingStats> {
        TimingStats::from_samples(&self.timings)
    }

    /// Fraction of runs that succeeded, 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        match self.runs() {
            0 => 0.0,
            runs => self.timings.len() as f64 / runs as f64,
        }
    }
}

/// Run every scenario `runs` times, sequentially.
pub async fn run<E: QueryExecutor>(
    api: &StatsApi<E>,
    scenarios: &[Scenario],
    runs: usize,
) -> BenchmarkReport {
    info!("Running {} scenarios x {} runs", scenarios.len(), runs);

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let request = scenario.request();
        let mut result = ScenarioResult {
            scenario: *scenario,
            timings: Vec::with_capacity(runs),
            errors: Vec::new(),
        };

        for _ in 0..runs {
            let started = Instant::now();
            match api.fetch_uncached(&request).await {
                Ok(_) => result.timings.push(started.elapsed()),
                Err(e) => {
                    warn!("Scenario {} failed: {:#}", scenario, e);
                    result.errors.push(e.to_string());
                },
            }
        }

        results.push(result);
    }

    BenchmarkReport { results }
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub results: Vec<ScenarioResult>,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Warehouse Query Benchmark Report")?;
        writeln!(f, "================================")?;

        for result in &self.results {
            writeln!(f)?;
            writeln!(f, "{}", result.scenario)?;
            match result.stats() {
                Some(stats) => {
                    writeln!(f, "  Average execution time: {:.4} seconds", stats.avg.as_secs_f64())?;
                    writeln!(f, "  Min execution time: {:.4} seconds", stats.min.as_secs_f64())?;
                    writeln!(f, "  Max execution time: {:.4} seconds", stats.max.as_secs_f64())?;
                },
                None => writeln!(f, "  No data available")?,
            }
            writeln!(f, "  Success rate: {:.0}%", result.success_rate() * 100.0)?;
        }

        Ok(())
    }
}
