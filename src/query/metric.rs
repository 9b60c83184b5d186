//! Catalog of warehouse metrics.
//!
//! Each metric describes how one chain's fact table is read. The union
//! builder stamps the description out once per chain, so everything here is
//! chain-agnostic: table names get the chain suffix appended, and the token
//! lookup table is resolved per chain in the seeds schema.

use std::fmt;

use serde::Serialize;

use crate::query::chain::{Chain, ARBITRUM, BASE, ETHEREUM, OPTIMISM};
use crate::query::resolution::Resolution;
use crate::table::ColumnKind;

/// Alias of the literal chain label column added to every branch.
pub const CHAIN_COLUMN: &str = "chain";

/// Alias of the combined `symbol (Chain)` label on token-joined metrics.
pub const LABEL_COLUMN: &str = "label";

/// Timestamp column every fact table exposes; the date predicate applies to it.
pub const TS_COLUMN: &str = "ts";

/// A selected column: SQL expression (may reference `{resolution}`), output
/// alias and decoded kind.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub expr: &'static str,
    pub alias: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        expr: name,
        alias: name,
        kind,
    }
}

const fn expr(expr: &'static str, alias: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { expr, alias, kind }
}

impl ColumnSpec {
    /// Expression with the resolution placeholder filled in.
    pub fn render_expr(&self, resolution: Option<Resolution>) -> String {
        match resolution {
            Some(resolution) => self.expr.replace("{resolution}", resolution.as_str()),
            None => self.expr.to_string(),
        }
    }
}

/// Left join against `{environment}_seeds.{chain}_tokens` to resolve token
/// addresses into symbols. The key is compared case-insensitively.
#[derive(Debug, Clone, Copy)]
pub struct TokenJoin {
    /// Column of the fact table holding the token address
    pub key_column: &'static str,
}

/// Cross-chain rollup applied on top of the union.
#[derive(Debug, Clone, Copy)]
pub struct CrossChainGrouping {
    pub keys: &'static [&'static str],
    pub sums: &'static [&'static str],
}

/// Where the resolution shows up in the generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPlacement {
    /// Metric has a single table and no resolution
    None,
    /// `{table}_{resolution}_{chain}`
    Table,
    /// Column expressions reference `{resolution}`
    Columns,
    /// `ts` is truncated with `DATE_TRUNC('{resolution}', ts)` on a single
    /// event-level table; pair with `branch_group_by`
    Truncate,
}

/// Immutable description of a named metric query.
#[derive(Debug, Clone, Copy)]
pub struct MetricQuerySpec {
    pub name: &'static str,
    pub table: &'static str,
    pub chains: &'static [Chain],
    pub resolutions: &'static [Resolution],
    pub default_resolution: Option<Resolution>,
    pub placement: ResolutionPlacement,
    pub columns: &'static [ColumnSpec],
    pub token_join: Option<TokenJoin>,
    /// Aliases of the columns each branch groups by, for metrics aggregated
    /// in SQL per chain
    pub branch_group_by: &'static [&'static str],
    pub grouping: Option<CrossChainGrouping>,
}

impl MetricQuerySpec {
    pub fn supports_chain(&self, chain: &Chain) -> bool {
        self.chains.contains(chain)
    }

    pub fn supports_resolution(&self, resolution: Resolution) -> bool {
        self.resolutions.contains(&resolution)
    }

    /// `fct_perp_stats_daily_base_mainnet`, `fct_core_apr_base_mainnet`, ...
    pub fn table_name(&self, chain: &Chain, resolution: Option<Resolution>) -> String {
        match (self.placement, resolution) {
            (ResolutionPlacement::Table, Some(resolution)) => {
                format!("{}_{}_{}", self.table, resolution, chain.id)
            },
            _ => format!("{}_{}", self.table, chain.id),
        }
    }

    /// Columns produced by one chain's branch, in select order.
    pub fn branch_columns(&self) -> Vec<(&'static str, ColumnKind)> {
        let mut columns: Vec<(&'static str, ColumnKind)> =
            self.columns.iter().map(|c| (c.alias, c.kind)).collect();
        if self.token_join.is_some() {
            columns.push((LABEL_COLUMN, ColumnKind::Text));
        }
        columns.push((CHAIN_COLUMN, ColumnKind::Text));
        columns
    }

    /// Columns of the final statement, after any cross-chain rollup.
    pub fn output_columns(&self) -> Vec<(&'static str, ColumnKind)> {
        let branch = self.branch_columns();
        match self.grouping {
            None => branch,
            Some(grouping) => grouping
                .keys
                .iter()
                .chain(grouping.sums.iter())
                .map(|name| {
                    let kind = branch
                        .iter()
                        .find(|(alias, _)| alias == name)
                        .map(|(_, kind)| *kind)
                        .unwrap_or(ColumnKind::Float);
                    (*name, kind)
                })
                .collect(),
        }
    }
}

/// Named metrics available in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PerpsStats,
    PerpsV2Stats,
    PerpsMarketStats,
    PerpsOpenInterest,
    PerpsKeeperStats,
    PerpsIntegratorStats,
    CoreStatsByCollateral,
    CoreStatsByChain,
    Buyback,
    CoreAccountActivity,
    PerpsAccountActivity,
    CoreNofStakers,
}

impl Metric {
    pub const ALL: &'static [Metric] = &[
        Metric::PerpsStats,
        Metric::PerpsV2Stats,
        Metric::PerpsMarketStats,
        Metric::PerpsOpenInterest,
        Metric::PerpsKeeperStats,
        Metric::PerpsIntegratorStats,
        Metric::CoreStatsByCollateral,
        Metric::CoreStatsByChain,
        Metric::Buyback,
        Metric::CoreAccountActivity,
        Metric::PerpsAccountActivity,
        Metric::CoreNofStakers,
    ];

    pub fn spec(&self) -> &'static MetricQuerySpec {
        match self {
            Metric::PerpsStats => &PERPS_STATS,
            Metric::PerpsV2Stats => &PERPS_V2_STATS,
            Metric::PerpsMarketStats => &PERPS_MARKET_STATS,
            Metric::PerpsOpenInterest => &PERPS_OPEN_INTEREST,
            Metric::PerpsKeeperStats => &PERPS_KEEPER_STATS,
            Metric::PerpsIntegratorStats => &PERPS_INTEGRATOR_STATS,
            Metric::CoreStatsByCollateral => &CORE_STATS_BY_COLLATERAL,
            Metric::CoreStatsByChain => &CORE_STATS_BY_CHAIN,
            Metric::Buyback => &BUYBACK,
            Metric::CoreAccountActivity => &CORE_ACCOUNT_ACTIVITY,
            Metric::PerpsAccountActivity => &PERPS_ACCOUNT_ACTIVITY,
            Metric::CoreNofStakers => &CORE_NOF_STAKERS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================
// Catalog
// ============================================

const BUCKETS: &[Resolution] = &[Resolution::Daily, Resolution::Hourly];
const APR_WINDOWS: &[Resolution] = &[Resolution::Apr28d, Resolution::Apr7d, Resolution::Apr24h];
const TRUNCATIONS: &[Resolution] = &[Resolution::Day, Resolution::Month];

const PERPS_CHAINS: &[Chain] = &[BASE, ARBITRUM];
const CORE_CHAINS: &[Chain] = &[ETHEREUM, BASE, ARBITRUM];

static PERPS_STATS: MetricQuerySpec = MetricQuerySpec {
    name: "perps_stats",
    table: "fct_perp_stats",
    chains: PERPS_CHAINS,
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("volume", ColumnKind::Float),
        col("trades", ColumnKind::Float),
        col("exchange_fees", ColumnKind::Float),
        col("liquidated_accounts", ColumnKind::Float),
        col("liquidation_rewards", ColumnKind::Float),
        col("cumulative_exchange_fees", ColumnKind::Float),
        col("cumulative_volume", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static PERPS_V2_STATS: MetricQuerySpec = MetricQuerySpec {
    name: "perps_v2_stats",
    table: "fct_v2_stats",
    chains: &[OPTIMISM],
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("volume", ColumnKind::Float),
        col("trades", ColumnKind::Float),
        expr(
            "exchange_fees + liquidation_fees",
            "exchange_fees",
            ColumnKind::Float,
        ),
        col("liquidations", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static PERPS_MARKET_STATS: MetricQuerySpec = MetricQuerySpec {
    name: "perps_market_stats",
    table: "fct_perp_market_stats",
    chains: PERPS_CHAINS,
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("market_symbol", ColumnKind::Text),
        col("volume", ColumnKind::Float),
        col("trades", ColumnKind::Float),
        col("exchange_fees", ColumnKind::Float),
        col("liquidations", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static PERPS_OPEN_INTEREST: MetricQuerySpec = MetricQuerySpec {
    name: "perps_open_interest",
    table: "fct_perp_market_history",
    chains: PERPS_CHAINS,
    resolutions: &[],
    default_resolution: None,
    placement: ResolutionPlacement::None,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("market_symbol", ColumnKind::Text),
        col("total_oi_usd", ColumnKind::Float),
        col("long_oi_pct", ColumnKind::Float),
        col("short_oi_pct", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static PERPS_KEEPER_STATS: MetricQuerySpec = MetricQuerySpec {
    name: "perps_keeper_stats",
    table: "fct_perp_keeper_stats",
    chains: PERPS_CHAINS,
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        expr("keeper", "keeper_full", ColumnKind::Text),
        expr(
            "CONCAT(SUBSTRING(keeper, 1, 6), '...', SUBSTRING(keeper, LENGTH(keeper) - 3, LENGTH(keeper)))",
            "keeper",
            ColumnKind::Text,
        ),
        col("trades", ColumnKind::Float),
        col("trades_pct", ColumnKind::Float),
        col("amount_settled", ColumnKind::Float),
        col("amount_settled_pct", ColumnKind::Float),
        col("settlement_rewards", ColumnKind::Float),
        col("settlement_rewards_pct", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static PERPS_INTEGRATOR_STATS: MetricQuerySpec = MetricQuerySpec {
    name: "perps_integrator_stats",
    table: "fct_perp_tracking_stats",
    chains: PERPS_CHAINS,
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        expr(
            "CASE WHEN tracking_code = '' THEN 'No tracking code' ELSE COALESCE(tracking_code, 'No tracking code') END",
            "tracking_code",
            ColumnKind::Text,
        ),
        col("accounts", ColumnKind::Float),
        col("volume", ColumnKind::Float),
        col("volume_share", ColumnKind::Float),
        col("trades", ColumnKind::Float),
        col("trades_share", ColumnKind::Float),
        col("exchange_fees", ColumnKind::Float),
        col("exchange_fees_share", ColumnKind::Float),
        col("referral_fees", ColumnKind::Float),
        col("referral_fees_share", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static CORE_STATS_BY_COLLATERAL: MetricQuerySpec = MetricQuerySpec {
    name: "core_stats_by_collateral",
    table: "fct_core_apr",
    chains: CORE_CHAINS,
    resolutions: APR_WINDOWS,
    default_resolution: Some(Resolution::Apr7d),
    placement: ResolutionPlacement::Columns,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("collateral_type", ColumnKind::Text),
        col("collateral_value", ColumnKind::Float),
        col("debt", ColumnKind::Float),
        col("hourly_pnl", ColumnKind::Float),
        col("rewards_usd", ColumnKind::Float),
        col("hourly_issuance", ColumnKind::Float),
        col("cumulative_issuance", ColumnKind::Float),
        col("cumulative_pnl", ColumnKind::Float),
        expr("apr_{resolution}", "apr", ColumnKind::Float),
        expr("apr_{resolution}_pnl", "apr_pnl", ColumnKind::Float),
        expr("apr_{resolution}_rewards", "apr_rewards", ColumnKind::Float),
    ],
    token_join: Some(TokenJoin {
        key_column: "collateral_type",
    }),
    branch_group_by: &[],
    grouping: None,
};

static CORE_STATS_BY_CHAIN: MetricQuerySpec = MetricQuerySpec {
    name: "core_stats_by_chain",
    table: "fct_core_apr",
    chains: CORE_CHAINS,
    resolutions: &[],
    default_resolution: None,
    placement: ResolutionPlacement::None,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("collateral_value", ColumnKind::Float),
        col("cumulative_pnl", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: Some(CrossChainGrouping {
        keys: &["ts", CHAIN_COLUMN],
        sums: &["collateral_value", "cumulative_pnl"],
    }),
};

static BUYBACK: MetricQuerySpec = MetricQuerySpec {
    name: "buyback",
    table: "fct_buyback",
    chains: &[BASE],
    resolutions: BUCKETS,
    default_resolution: Some(Resolution::Daily),
    placement: ResolutionPlacement::Table,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("snx_amount", ColumnKind::Float),
        col("usd_amount", ColumnKind::Float),
        col("cumulative_snx_amount", ColumnKind::Float),
        col("cumulative_usd_amount", ColumnKind::Float),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

static CORE_ACCOUNT_ACTIVITY: MetricQuerySpec = MetricQuerySpec {
    name: "core_account_activity",
    table: "fct_core_account_activity",
    chains: CORE_CHAINS,
    resolutions: TRUNCATIONS,
    default_resolution: Some(Resolution::Day),
    placement: ResolutionPlacement::Truncate,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        expr("account_action", "action", ColumnKind::Text),
        expr("COUNT(DISTINCT account_id)", "nof_accounts", ColumnKind::Integer),
    ],
    token_join: None,
    branch_group_by: &["ts", "action"],
    grouping: None,
};

static PERPS_ACCOUNT_ACTIVITY: MetricQuerySpec = MetricQuerySpec {
    name: "perps_account_activity",
    table: "fct_perp_account_activity",
    chains: PERPS_CHAINS,
    resolutions: TRUNCATIONS,
    default_resolution: Some(Resolution::Day),
    placement: ResolutionPlacement::Truncate,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        expr("COUNT(DISTINCT account_id)", "nof_accounts", ColumnKind::Integer),
    ],
    token_join: None,
    branch_group_by: &["ts"],
    grouping: None,
};

static CORE_NOF_STAKERS: MetricQuerySpec = MetricQuerySpec {
    name: "core_nof_stakers",
    table: "fct_core_nof_stakers",
    chains: CORE_CHAINS,
    resolutions: &[],
    default_resolution: None,
    placement: ResolutionPlacement::None,
    columns: &[
        col("ts", ColumnKind::Timestamp),
        col("nof_stakers", ColumnKind::Integer),
    ],
    token_join: None,
    branch_group_by: &[],
    grouping: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(
            Metric::PerpsStats
                .spec()
                .table_name(&BASE, Some(Resolution::Hourly)),
            "fct_perp_stats_hourly_base_mainnet"
        );
        assert_eq!(
            Metric::CoreStatsByCollateral
                .spec()
                .table_name(&ARBITRUM, Some(Resolution::Apr7d)),
            "fct_core_apr_arbitrum_mainnet"
        );
    }

    #[test]
    fn test_apr_columns_follow_resolution() {
        let spec = Metric::CoreStatsByCollateral.spec();
        let apr = spec.columns.iter().find(|c| c.alias == "apr_pnl").unwrap();
        assert_eq!(apr.render_expr(Some(Resolution::Apr28d)), "apr_28d_pnl");
    }

    #[test]
    fn test_truncated_metrics_read_one_table_per_chain() {
        let spec = Metric::CoreAccountActivity.spec();
        assert_eq!(
            spec.table_name(&BASE, Some(Resolution::Month)),
            "fct_core_account_activity_base_mainnet"
        );
        for key in spec.branch_group_by {
            assert!(spec.columns.iter().any(|c| c.alias == *key), "{key}");
        }
    }

    #[test]
    fn test_every_metric_starts_with_ts() {
        for metric in Metric::ALL {
            let spec = metric.spec();
            assert_eq!(spec.columns[0].alias, TS_COLUMN, "{metric}");
            assert!(!spec.chains.is_empty(), "{metric}");
            assert_eq!(
                spec.default_resolution.is_some(),
                !spec.resolutions.is_empty(),
                "{metric}"
            );
        }
    }

    #[test]
    fn test_output_columns_after_grouping() {
        let names: Vec<&str> = Metric::CoreStatsByChain
            .spec()
            .output_columns()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["ts", "chain", "collateral_value", "cumulative_pnl"]);
    }

    #[test]
    fn test_branch_columns_carry_labels() {
        let names: Vec<&str> = Metric::CoreStatsByCollateral
            .spec()
            .branch_columns()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.last(), Some(&CHAIN_COLUMN));
        assert!(names.contains(&LABEL_COLUMN));
    }
}
