//! Per-chain `UNION ALL` query construction.
//!
//! Identifiers (schemas, tables, columns) come from the static chain
//! registry and metric catalog and are checked against an allow-list before
//! they reach the SQL text. Values (the date bounds) are never interpolated;
//! they are bound as `$1`/`$2` parameters shared by every branch.

use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;

use crate::error::{QueryError, Result};
use crate::query::chain::Chain;
use crate::query::metric::{
    ColumnSpec, MetricQuerySpec, ResolutionPlacement, CHAIN_COLUMN, LABEL_COLUMN, TS_COLUMN,
};
use crate::query::resolver::ResolvedQuery;
use crate::table::{Column, ColumnKind, ResultTable};

/// Alias of the fact table inside each branch.
const FACT_ALIAS: &str = "f";

/// Alias of the token lookup table inside each branch.
const TOKEN_ALIAS: &str = "tk";

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Timestamp(DateTime<Utc>),
}

impl QueryParam {
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Timestamp(ts) => ts,
        }
    }
}

/// A statement ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Metric name, for logging
    pub name: &'static str,
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// Output shape, also used when the warehouse returns no rows
    pub columns: Vec<(&'static str, ColumnKind)>,
}

impl Query {
    pub fn sql_params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(QueryParam::as_sql).collect()
    }

    /// Zero-row table with this statement's output shape.
    pub fn empty_table(&self) -> ResultTable {
        ResultTable::empty(
            self.columns
                .iter()
                .map(|(name, kind)| Column::new(*name, *kind))
                .collect(),
        )
    }
}

/// Builds one statement covering every resolved chain of a metric.
#[derive(Debug, Clone)]
pub struct UnionQueryBuilder {
    environment: String,
}

impl UnionQueryBuilder {
    /// `environment` prefixes every schema (`prod` -> `prod_base_mainnet`).
    pub fn new(environment: &str) -> Result<Self> {
        Ok(Self {
            environment: validate_identifier(environment)?.to_string(),
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn build(&self, resolved: &ResolvedQuery) -> Result<Query> {
        let spec = resolved.spec();

        if resolved.chains.is_empty() {
            return Ok(empty_query(spec));
        }

        let branches = resolved
            .chains
            .iter()
            .map(|chain| self.build_branch(resolved, chain))
            .collect::<Result<Vec<String>>>()?;

        let union = branches.join("\nUNION ALL\n");

        let sql = match spec.grouping {
            None => format!("{union}\nORDER BY {TS_COLUMN}"),
            Some(grouping) => {
                let keys = grouping.keys.join(", ");
                let sums: Vec<String> = grouping
                    .sums
                    .iter()
                    .map(|column| format!("SUM({column}) AS {column}"))
                    .collect();
                format!(
                    "SELECT {keys}, {sums}\nFROM (\n{union}\n) AS unioned\nGROUP BY {keys}\nORDER BY {TS_COLUMN}",
                    sums = sums.join(", "),
                )
            },
        };

        Ok(Query {
            name: spec.name,
            sql,
            params: vec![
                QueryParam::Timestamp(resolved.range.start),
                QueryParam::Timestamp(resolved.range.end),
            ],
            columns: spec.output_columns(),
        })
    }

    /// SQL for a single chain's branch, without ordering or cross-chain rollup.
    pub fn build_branch(&self, resolved: &ResolvedQuery, chain: &Chain) -> Result<String> {
        let spec = resolved.spec();
        let chain_id = validate_identifier(chain.id)?;
        let table = resolved.table_name(chain);
        validate_identifier(&table)?;

        let mut select: Vec<String> = spec
            .columns
            .iter()
            .map(|column| render_column(column, resolved))
            .collect();

        let mut joins = String::new();
        if let Some(join) = spec.token_join {
            let key = validate_identifier(join.key_column)?;
            select.push(format!(
                "CONCAT(COALESCE({TOKEN_ALIAS}.token_symbol, {FACT_ALIAS}.{key}), {label}) AS {LABEL_COLUMN}",
                label = quote_literal(&format!(" ({})", chain.label)),
            ));
            joins = format!(
                "\nLEFT JOIN {env}_seeds.{chain_id}_tokens {TOKEN_ALIAS} ON LOWER({FACT_ALIAS}.{key}) = LOWER({TOKEN_ALIAS}.token_address)",
                env = self.environment,
            );
        }

        select.push(format!("{} AS {CHAIN_COLUMN}", quote_literal(chain.label)));

        let mut group_by = String::new();
        if !spec.branch_group_by.is_empty() {
            let keys = spec
                .branch_group_by
                .iter()
                .map(|alias| {
                    spec.columns
                        .iter()
                        .find(|column| column.alias == *alias)
                        .map(|column| column_expr(column, resolved))
                        .ok_or_else(|| QueryError::MissingColumn(alias.to_string()))
                })
                .collect::<Result<Vec<String>>>()?;
            group_by = format!("\nGROUP BY {}", keys.join(", "));
        }

        Ok(format!(
            "SELECT\n    {columns}\nFROM {env}_{chain_id}.{table} {FACT_ALIAS}{joins}\nWHERE {FACT_ALIAS}.{TS_COLUMN} >= $1 AND {FACT_ALIAS}.{TS_COLUMN} <= $2{group_by}",
            columns = select.join(",\n    "),
            env = self.environment,
        ))
    }
}

/// Zero-row statement with the metric's output shape.
fn empty_query(spec: &MetricQuerySpec) -> Query {
    let columns = spec.output_columns();
    let select: Vec<String> = columns
        .iter()
        .map(|(alias, kind)| format!("CAST(NULL AS {}) AS {alias}", kind.sql_type()))
        .collect();

    Query {
        name: spec.name,
        sql: format!("SELECT {} WHERE FALSE", select.join(", ")),
        params: Vec::new(),
        columns,
    }
}

/// Column expression without its alias, `ts` truncated where the metric asks.
fn column_expr(column: &ColumnSpec, resolved: &ResolvedQuery) -> String {
    let expr = column.render_expr(resolved.resolution);
    match (resolved.spec().placement, resolved.resolution) {
        (ResolutionPlacement::Truncate, Some(unit)) if column.alias == TS_COLUMN => {
            format!("DATE_TRUNC({}, {expr})", quote_literal(unit.as_str()))
        },
        _ => expr,
    }
}

fn render_column(column: &ColumnSpec, resolved: &ResolvedQuery) -> String {
    let expr = column_expr(column, resolved);
    match column.kind {
        ColumnKind::Float | ColumnKind::Integer => {
            format!("CAST({expr} AS {}) AS {}", column.kind.sql_type(), column.alias)
        },
        _ if expr == column.alias => expr,
        _ => format!("{expr} AS {}", column.alias),
    }
}

/// Allow-list for identifiers spliced into SQL: lowercase ASCII letters,
/// digits and underscores, starting with a letter.
pub fn validate_identifier(identifier: &str) -> Result<&str> {
    let mut chars = identifier.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(identifier)
    } else {
        Err(QueryError::InvalidIdentifier(identifier.to_string()))
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::query::chain::{ChainSelector, ARBITRUM, BASE, OPTIMISM};
    use crate::query::date_range::DateRange;
    use crate::query::metric::Metric;
    use crate::query::resolution::Resolution;
    use crate::query::resolver::{resolve, MetricRequest};

    fn range() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn resolved(metric: Metric, chains: ChainSelector) -> ResolvedQuery {
        resolve(&MetricRequest::new(metric, chains, range())).unwrap()
    }

    fn resolved_with(metric: Metric, resolution: Option<Resolution>) -> ResolvedQuery {
        let mut request = MetricRequest::new(metric, ChainSelector::All, range());
        request.resolution = resolution;
        resolve(&request).unwrap()
    }

    fn builder() -> UnionQueryBuilder {
        UnionQueryBuilder::new("prod").unwrap()
    }

    #[test]
    fn test_union_all_per_chain() {
        let query = builder()
            .build(&resolved(Metric::CoreStatsByCollateral, ChainSelector::All))
            .unwrap();

        assert_eq!(query.sql.matches("UNION ALL").count(), 2);
        assert_eq!(query.sql.matches("UNION").count(), 2);
        assert!(query.sql.contains("FROM prod_eth_mainnet.fct_core_apr_eth_mainnet f"));
        assert!(query.sql.contains("FROM prod_base_mainnet.fct_core_apr_base_mainnet f"));
        assert!(query
            .sql
            .contains("FROM prod_arbitrum_mainnet.fct_core_apr_arbitrum_mainnet f"));
        assert!(query.sql.ends_with("ORDER BY ts"));

        // Registry order
        let eth = query.sql.find("'Ethereum' AS chain").unwrap();
        let base = query.sql.find("'Base' AS chain").unwrap();
        let arb = query.sql.find("'Arbitrum' AS chain").unwrap();
        assert!(eth < base && base < arb);
    }

    #[test]
    fn test_union_branch_matches_single_chain_query() {
        let builder = builder();
        let all = resolved(Metric::PerpsStats, ChainSelector::All);
        let single = resolved(Metric::PerpsStats, ChainSelector::One(ARBITRUM));

        let union = builder.build(&all).unwrap();
        let single_branch = builder.build_branch(&single, &ARBITRUM).unwrap();
        let single_query = builder.build(&single).unwrap();

        assert!(union.sql.contains(&single_branch));
        assert_eq!(single_query.sql, format!("{single_branch}\nORDER BY ts"));
        assert_eq!(union.params, single_query.params);
    }

    #[test]
    fn test_dates_are_bound_not_interpolated() {
        let query = builder()
            .build(&resolved(Metric::PerpsStats, ChainSelector::All))
            .unwrap();

        assert!(!query.sql.contains("2024"));
        assert!(query.sql.contains("f.ts >= $1 AND f.ts <= $2"));
        assert_eq!(
            query.params,
            vec![
                QueryParam::Timestamp(range().start),
                QueryParam::Timestamp(range().end)
            ]
        );
        assert_eq!(query.sql_params().len(), 2);
    }

    #[test]
    fn test_token_join_and_label() {
        let resolved = resolve(
            &MetricRequest::new(Metric::CoreStatsByCollateral, ChainSelector::One(BASE), range())
                .with_resolution(Resolution::Apr28d),
        )
        .unwrap();
        let query = builder().build(&resolved).unwrap();

        assert!(query.sql.contains(
            "LEFT JOIN prod_seeds.base_mainnet_tokens tk ON LOWER(f.collateral_type) = LOWER(tk.token_address)"
        ));
        assert!(query
            .sql
            .contains("CONCAT(COALESCE(tk.token_symbol, f.collateral_type), ' (Base)') AS label"));
        assert!(query.sql.contains("CAST(apr_28d AS DOUBLE PRECISION) AS apr"));
        assert!(query.sql.contains("CAST(apr_28d_rewards AS DOUBLE PRECISION) AS apr_rewards"));
    }

    #[test]
    fn test_cross_chain_grouping_wrapper() {
        let query = builder()
            .build(&resolved(Metric::CoreStatsByChain, ChainSelector::All))
            .unwrap();

        assert!(query.sql.starts_with(
            "SELECT ts, chain, SUM(collateral_value) AS collateral_value, SUM(cumulative_pnl) AS cumulative_pnl\nFROM ("
        ));
        assert!(query.sql.contains(") AS unioned\nGROUP BY ts, chain\nORDER BY ts"));
        let names: Vec<&str> = query.columns.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["ts", "chain", "collateral_value", "cumulative_pnl"]);
    }

    #[test]
    fn test_empty_chain_set_yields_shaped_empty_query() {
        let resolved = resolved(Metric::PerpsStats, ChainSelector::One(OPTIMISM));
        let query = builder().build(&resolved).unwrap();

        assert!(query.params.is_empty());
        assert!(query.sql.ends_with("WHERE FALSE"));
        assert!(query.sql.contains("CAST(NULL AS TIMESTAMPTZ) AS ts"));
        assert!(query.sql.contains("CAST(NULL AS TEXT) AS chain"));
        assert_eq!(query.columns.len(), Metric::PerpsStats.spec().columns.len() + 1);
    }

    #[test]
    fn test_truncated_activity_groups_each_branch() {
        let resolved = resolve(
            &MetricRequest::new(Metric::CoreAccountActivity, ChainSelector::All, range())
                .with_resolution(Resolution::Month),
        )
        .unwrap();
        let query = builder().build(&resolved).unwrap();

        assert!(query.sql.contains("DATE_TRUNC('month', ts) AS ts"));
        assert!(query.sql.contains("account_action AS action"));
        assert!(query
            .sql
            .contains("CAST(COUNT(DISTINCT account_id) AS BIGINT) AS nof_accounts"));
        assert!(query
            .sql
            .contains("FROM prod_eth_mainnet.fct_core_account_activity_eth_mainnet f"));
        assert_eq!(
            query
                .sql
                .matches("WHERE f.ts >= $1 AND f.ts <= $2\nGROUP BY DATE_TRUNC('month', ts), account_action")
                .count(),
            3
        );
        assert!(query.sql.ends_with("account_action\nORDER BY ts"));

        let perps = resolved_with(Metric::PerpsAccountActivity, None);
        let sql = builder().build(&perps).unwrap().sql;
        assert!(sql.contains("DATE_TRUNC('day', ts) AS ts"));
        assert_eq!(sql.matches("GROUP BY DATE_TRUNC('day', ts)\n").count(), 2);
    }

    #[test]
    fn test_untruncated_metrics_have_no_branch_group_by() {
        let sql = builder()
            .build(&resolved(Metric::CoreNofStakers, ChainSelector::All))
            .unwrap()
            .sql;
        assert!(!sql.contains("DATE_TRUNC"));
        assert!(!sql.contains("GROUP BY"));
        assert!(sql.contains("CAST(nof_stakers AS BIGINT) AS nof_stakers"));
    }

    #[test]
    fn test_identifier_allow_list() {
        assert!(validate_identifier("prod").is_ok());
        assert!(validate_identifier("dev_2").is_ok());
        assert!(validate_identifier("prod; DROP TABLE x").is_err());
        assert!(validate_identifier("Prod").is_err());
        assert!(validate_identifier("").is_err());
        assert!(matches!(
            UnionQueryBuilder::new("prod\"").unwrap_err(),
            QueryError::InvalidIdentifier(_)
        ));
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(quote_literal("O'Chain"), "'O''Chain'");
    }
}
