//! Dashboard-facing data access.
//!
//! [`StatsApi`] ties resolution, query building, caching and execution
//! together. Views return named structs rather than loose maps of tables, so
//! callers know which tables (and which columns) they get. A view issues
//! its metric queries one at a time and stops at the first failure.

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::aggregate;
use crate::cache::{CacheKey, QueryCache};
use crate::db::QueryExecutor;
use crate::error::Result;
use crate::query::{
    resolve, ChainSelector, DateRange, Metric, MetricRequest, Query, Resolution, UnionQueryBuilder,
};
use crate::table::ResultTable;

/// Cache function identity for metric fetches.
const FETCH_FN: &str = "fetch";

/// Collateral, TVL and APR views of the core system.
#[derive(Debug, Clone, Serialize)]
pub struct CoreStats {
    /// One row per (ts, collateral, chain); `label` is `SYMBOL (Chain)`
    pub by_collateral: Arc<ResultTable>,
    /// Collateral value and PnL per (ts, chain)
    pub by_chain: Arc<ResultTable>,
}

/// Perps market views.
#[derive(Debug, Clone, Serialize)]
pub struct PerpsStats {
    pub stats: Arc<ResultTable>,
    pub open_interest: Arc<ResultTable>,
    /// Absent when no selected chain runs buybacks
    pub buyback: Option<Arc<ResultTable>>,
}

/// Totals across chains and protocol versions.
#[derive(Debug, Clone, Serialize)]
pub struct CrossChainStats {
    /// v3 and v2 perps stats stacked, aligned by column name
    pub perps_stats: ResultTable,
    pub tvl_by_chain: Arc<ResultTable>,
    /// 28 day APR per collateral
    pub apr_by_collateral: Arc<ResultTable>,
    /// Open interest summed per (ts, chain) over all markets
    pub open_interest_by_chain: ResultTable,
}

/// Distinct active accounts, summed over the selected chains.
#[derive(Debug, Clone, Serialize)]
pub struct AccountActivity {
    /// Accounts per (day, action)
    pub core_daily: ResultTable,
    /// Accounts per (month, action)
    pub core_monthly: ResultTable,
    /// Stakers per (ts, chain)
    pub core_stakers: Arc<ResultTable>,
    pub perps_daily: ResultTable,
    pub perps_monthly: ResultTable,
}

pub struct StatsApi<E> {
    executor: E,
    builder: UnionQueryBuilder,
    cache: QueryCache,
}

impl<E: QueryExecutor> StatsApi<E> {
    /// `environment` selects the warehouse schemas (`prod`, `dev`, ...).
    pub fn new(executor: E, environment: &str, cache: QueryCache) -> Result<Self> {
        Ok(Self {
            executor,
            builder: UnionQueryBuilder::new(environment)?,
            cache,
        })
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Validate and build the statement for a request.
    pub fn prepare(&self, request: &MetricRequest) -> Result<Query> {
        let resolved = resolve(request)?;
        self.builder.build(&resolved)
    }

    /// Fetch one metric, memoized per request.
    ///
    /// Validation errors are raised before the cache or the warehouse are
    /// touched. A chain set with no supporting chain yields a zero-row table
    /// without a round-trip.
    pub async fn fetch(&self, request: &MetricRequest) -> Result<Arc<ResultTable>> {
        let resolved = resolve(request)?;
        let query = self.builder.build(&resolved)?;

        if resolved.chains.is_empty() {
            return Ok(Arc::new(query.empty_table()));
        }

        let key = CacheKey::new(FETCH_FN, &(self.builder.environment(), request));
        self.cache
            .get_or_try_insert_with(key, self.executor.execute(&query))
            .await
    }

    /// Fetch one metric, bypassing the cache.
    pub async fn fetch_uncached(&self, request: &MetricRequest) -> Result<ResultTable> {
        let resolved = resolve(request)?;
        let query = self.builder.build(&resolved)?;

        if resolved.chains.is_empty() {
            return Ok(query.empty_table());
        }

        self.executor.execute(&query).await
    }

    pub async fn core_stats(
        &self,
        chains: ChainSelector,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<CoreStats> {
        let by_collateral = MetricRequest::new(Metric::CoreStatsByCollateral, chains, range)
            .with_resolution(resolution);
        let by_chain = MetricRequest::new(Metric::CoreStatsByChain, chains, range);

        Ok(CoreStats {
            by_collateral: self.fetch(&by_collateral).await?,
            by_chain: self.fetch(&by_chain).await?,
        })
    }

    pub async fn perps_stats(
        &self,
        chains: ChainSelector,
        range: DateRange,
        resolution: Resolution,
    ) -> Result<PerpsStats> {
        let stats = MetricRequest::new(Metric::PerpsStats, chains, range).with_resolution(resolution);
        let open_interest = MetricRequest::new(Metric::PerpsOpenInterest, chains, range);
        let buyback = MetricRequest::new(Metric::Buyback, chains, range).with_resolution(resolution);

        let stats = self.fetch(&stats).await?;
        let open_interest = self.fetch(&open_interest).await?;

        let buyback = if resolve(&buyback)?.chains.is_empty() {
            debug!("No buyback data for chain selector {chains}");
            None
        } else {
            Some(self.fetch(&buyback).await?)
        };

        Ok(PerpsStats {
            stats,
            open_interest,
            buyback,
        })
    }

    pub async fn cross_chain_stats(
        &self,
        chains: ChainSelector,
        range: DateRange,
    ) -> Result<CrossChainStats> {
        let v3 = MetricRequest::new(Metric::PerpsStats, chains, range);
        let v2 = MetricRequest::new(Metric::PerpsV2Stats, chains, range);
        let tvl = MetricRequest::new(Metric::CoreStatsByChain, chains, range);
        let apr = MetricRequest::new(Metric::CoreStatsByCollateral, chains, range)
            .with_resolution(Resolution::Apr28d);
        let open_interest = MetricRequest::new(Metric::PerpsOpenInterest, chains, range);

        let v3 = self.fetch(&v3).await?;
        let v2 = self.fetch(&v2).await?;
        let tvl_by_chain = self.fetch(&tvl).await?;
        let apr_by_collateral = self.fetch(&apr).await?;
        let open_interest = self.fetch(&open_interest).await?;

        Ok(CrossChainStats {
            perps_stats: aggregate::concat(&[&v3, &v2]),
            tvl_by_chain,
            apr_by_collateral,
            open_interest_by_chain: aggregate::sum_by(
                &open_interest,
                "ts",
                &["chain"],
                &["total_oi_usd"],
            )?,
        })
    }

    pub async fn account_activity(
        &self,
        chains: ChainSelector,
        range: DateRange,
    ) -> Result<AccountActivity> {
        let core = MetricRequest::new(Metric::CoreAccountActivity, chains, range);
        let perps = MetricRequest::new(Metric::PerpsAccountActivity, chains, range);
        let stakers = MetricRequest::new(Metric::CoreNofStakers, chains, range);

        let core_daily = self.fetch(&core.with_resolution(Resolution::Day)).await?;
        let core_monthly = self.fetch(&core.with_resolution(Resolution::Month)).await?;
        let core_stakers = self.fetch(&stakers).await?;
        let perps_daily = self.fetch(&perps.with_resolution(Resolution::Day)).await?;
        let perps_monthly = self.fetch(&perps.with_resolution(Resolution::Month)).await?;

        let by_action = |table: &ResultTable| {
            aggregate::sum_by(table, "ts", &["action"], &["nof_accounts"])
        };
        let by_date = |table: &ResultTable| aggregate::sum_by(table, "ts", &[], &["nof_accounts"]);

        Ok(AccountActivity {
            core_daily: by_action(&core_daily)?,
            core_monthly: by_action(&core_monthly)?,
            core_stakers,
            perps_daily: by_date(&perps_daily)?,
            perps_monthly: by_date(&perps_monthly)?,
        })
    }
}
