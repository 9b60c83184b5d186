use std::fmt;

use serde::Serialize;

/// Time-bucket granularity of a metric, or an APR averaging window.
///
/// Bucket resolutions select the fact table (`fct_perp_stats_daily_...`),
/// APR windows select columns (`apr_7d`, `apr_7d_pnl`, ...) and truncation
/// units are handed to `DATE_TRUNC` on event-level tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resolution {
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "24h")]
    Apr24h,
    #[serde(rename = "7d")]
    Apr7d,
    #[serde(rename = "28d")]
    Apr28d,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "month")]
    Month,
}

impl Resolution {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Apr24h => "24h",
            Self::Apr7d => "7d",
            Self::Apr28d => "28d",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Parse the string form. Returns `None` for anything unknown; callers
    /// turn that into an error naming the metric.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "24h" => Some(Self::Apr24h),
            "7d" => Some(Self::Apr7d),
            "28d" => Some(Self::Apr28d),
            "day" => Some(Self::Day),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matches_as_str() {
        for resolution in [
            Resolution::Hourly,
            Resolution::Daily,
            Resolution::Apr24h,
            Resolution::Apr7d,
            Resolution::Apr28d,
            Resolution::Day,
            Resolution::Month,
        ] {
            assert_eq!(Resolution::parse(resolution.as_str()), Some(resolution));
        }
        assert_eq!(Resolution::parse("weekly"), None);
    }
}
