use log::debug;
use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::query::chain::{Chain, ChainSelector, CHAINS};
use crate::query::date_range::DateRange;
use crate::query::metric::{Metric, MetricQuerySpec};
use crate::query::resolution::Resolution;

/// Caller-supplied request before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MetricRequest {
    pub metric: Metric,
    pub chains: ChainSelector,
    pub resolution: Option<Resolution>,
    pub range: DateRange,
}

impl MetricRequest {
    pub fn new(metric: Metric, chains: ChainSelector, range: DateRange) -> Self {
        Self {
            metric,
            chains,
            resolution: None,
            range,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

/// A validated request: the concrete chains to query plus everything needed
/// to render their table and column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedQuery {
    pub metric: Metric,
    /// Chains to union, registry order. May be empty.
    pub chains: Vec<Chain>,
    pub resolution: Option<Resolution>,
    pub range: DateRange,
}

impl ResolvedQuery {
    pub fn spec(&self) -> &'static MetricQuerySpec {
        self.metric.spec()
    }

    /// Per-chain fact table, e.g. `fct_perp_stats_daily_base_mainnet`.
    pub fn table_name(&self, chain: &Chain) -> String {
        self.spec().table_name(chain, self.resolution)
    }
}

/// Validate a request and map it to concrete chains and a resolution.
///
/// A chain that exists but does not carry the metric resolves to an empty
/// chain set rather than an error, so callers get a well-typed empty table.
pub fn resolve(request: &MetricRequest) -> Result<ResolvedQuery> {
    let spec = request.metric.spec();

    let resolution = resolve_resolution(spec, request.resolution)?;

    let chains: Vec<Chain> = CHAINS
        .iter()
        .filter(|chain| request.chains.includes(chain) && spec.supports_chain(chain))
        .copied()
        .collect();

    if chains.is_empty() {
        debug!(
            "Metric {} has no data for chain selector {}",
            spec.name, request.chains
        );
    }

    Ok(ResolvedQuery {
        metric: request.metric,
        chains,
        resolution,
        range: request.range,
    })
}

/// Resolve from string inputs, as they arrive from query parameters.
pub fn resolve_str(
    metric: Metric,
    chain: &str,
    resolution: Option<&str>,
    range: DateRange,
) -> Result<ResolvedQuery> {
    let chains = ChainSelector::parse(chain)?;
    let resolution = resolution
        .map(|value| {
            Resolution::parse(value).ok_or_else(|| QueryError::UnsupportedResolution {
                metric: metric.name().to_string(),
                resolution: value.to_string(),
            })
        })
        .transpose()?;

    resolve(&MetricRequest {
        metric,
        chains,
        resolution,
        range,
    })
}

fn resolve_resolution(
    spec: &MetricQuerySpec,
    requested: Option<Resolution>,
) -> Result<Option<Resolution>> {
    match requested {
        None => Ok(spec.default_resolution),
        Some(resolution) if spec.supports_resolution(resolution) => Ok(Some(resolution)),
        Some(resolution) => Err(QueryError::UnsupportedResolution {
            metric: spec.name.to_string(),
            resolution: resolution.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::query::chain::{ARBITRUM, BASE, ETHEREUM, OPTIMISM};

    fn range() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_all_expands_in_registry_order() {
        let resolved =
            resolve(&MetricRequest::new(Metric::CoreStatsByCollateral, ChainSelector::All, range()))
                .unwrap();
        assert_eq!(resolved.chains, vec![ETHEREUM, BASE, ARBITRUM]);
        assert_eq!(resolved.resolution, Some(Resolution::Apr7d));
    }

    #[test]
    fn test_single_chain() {
        let resolved = resolve(
            &MetricRequest::new(Metric::PerpsStats, ChainSelector::One(ARBITRUM), range())
                .with_resolution(Resolution::Hourly),
        )
        .unwrap();
        assert_eq!(resolved.chains, vec![ARBITRUM]);
        assert_eq!(
            resolved.table_name(&ARBITRUM),
            "fct_perp_stats_hourly_arbitrum_mainnet"
        );
    }

    #[test]
    fn test_unsupported_chain_for_metric_is_empty() {
        let resolved =
            resolve(&MetricRequest::new(Metric::PerpsStats, ChainSelector::One(OPTIMISM), range()))
                .unwrap();
        assert!(resolved.chains.is_empty());
    }

    #[test]
    fn test_unknown_chain_rejected() {
        let err = resolve_str(Metric::PerpsStats, "mars_mainnet", None, range()).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedChain(ref id) if id == "mars_mainnet"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_resolution_outside_metric_set() {
        let err = resolve(
            &MetricRequest::new(Metric::PerpsStats, ChainSelector::All, range())
                .with_resolution(Resolution::Apr7d),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedResolution { .. }));

        let err = resolve_str(Metric::CoreStatsByCollateral, "all", Some("weekly"), range())
            .unwrap_err();
        assert!(
            matches!(err, QueryError::UnsupportedResolution { ref resolution, .. } if resolution == "weekly")
        );
    }

    #[test]
    fn test_metric_without_resolutions_rejects_explicit_one() {
        let err = resolve(
            &MetricRequest::new(Metric::PerpsOpenInterest, ChainSelector::All, range())
                .with_resolution(Resolution::Daily),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedResolution { .. }));
    }

    #[test]
    fn test_account_activity_truncations() {
        let resolved =
            resolve(&MetricRequest::new(Metric::CoreAccountActivity, ChainSelector::All, range()))
                .unwrap();
        assert_eq!(resolved.resolution, Some(Resolution::Day));
        assert_eq!(resolved.chains, vec![ETHEREUM, BASE, ARBITRUM]);

        let resolved =
            resolve_str(Metric::PerpsAccountActivity, "all", Some("month"), range()).unwrap();
        assert_eq!(resolved.resolution, Some(Resolution::Month));
        assert_eq!(resolved.chains, vec![BASE, ARBITRUM]);

        let err = resolve_str(Metric::CoreAccountActivity, "all", Some("hourly"), range())
            .unwrap_err();
        assert!(
            matches!(err, QueryError::UnsupportedResolution { ref resolution, .. } if resolution == "hourly")
        );

        // Truncation units only apply to event-level metrics
        let err = resolve(
            &MetricRequest::new(Metric::PerpsStats, ChainSelector::All, range())
                .with_resolution(Resolution::Month),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedResolution { .. }));
    }
}
