//! Number formatting for hover text and axes.

use serde::Serialize;

/// Magnitude suffixes, one per factor of 1000.
const MAGNITUDE_LABELS: [&str; 5] = ["", "K", "M", "B", "T"];

/// How a numeric series is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ValueFormat {
    /// `$` prefix, decimals kept
    #[default]
    #[serde(rename = "$")]
    Currency,
    /// Fractions of 1 shown as percentages with two decimals
    #[serde(rename = "%")]
    Percentage,
    /// Plain counts, no decimals
    #[serde(rename = "#")]
    Count,
}

impl ValueFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "$" => Some(Self::Currency),
            "%" => Some(Self::Percentage),
            "#" => Some(Self::Count),
            _ => None,
        }
    }

    /// Prefix shown in front of hover values.
    pub const fn hover_prefix(&self) -> &'static str {
        match self {
            Self::Currency => "$",
            Self::Percentage | Self::Count => "",
        }
    }

    /// Axis tick prefix.
    pub const fn tick_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Currency => Some("$"),
            Self::Percentage | Self::Count => None,
        }
    }

    /// Axis tick format (d3 syntax).
    pub const fn tick_format(&self) -> Option<&'static str> {
        match self {
            Self::Percentage => Some(".2%"),
            Self::Currency | Self::Count => None,
        }
    }

    /// Hover representation of a value, abbreviated when `human` is set.
    pub fn format(&self, value: f64, human: bool) -> String {
        if human {
            human_format(
                value,
                !matches!(self, Self::Currency),
                matches!(self, Self::Percentage),
            )
        } else {
            value.to_string()
        }
    }
}

/// Compact human-readable number.
///
/// - `percentage`: value is a fraction of 1, rendered `x100` with two decimals
///   and a `%` suffix (`0.5` -> `50.00%`)
/// - zero renders as `0`
/// - `|num| < 1` keeps three significant digits (`0.0034`)
/// - otherwise divided into K/M/B/T at a 1000 threshold and shown with three
///   digits (`1.00K`, `12.5M`, `999`), or no decimals with `no_decimals`;
///   thresholds compare the magnitude, so negatives mirror positives (`-250`)
pub fn human_format(num: f64, no_decimals: bool, percentage: bool) -> String {
    if percentage {
        return format!("{:.2}%", num * 100.0);
    }

    if num == 0.0 {
        return "0".to_string();
    }

    if !num.is_finite() {
        return num.to_string();
    }

    if num.abs() < 1.0 {
        return significant_digits(num, 3);
    }

    let mut num = num;
    let mut magnitude = 0;
    while num.abs() >= 1000.0 && magnitude < MAGNITUDE_LABELS.len() - 1 {
        magnitude += 1;
        num /= 1000.0;
    }

    let formatted = if no_decimals || num.abs() >= 100.0 {
        format!("{num:.0}")
    } else if num.abs() >= 10.0 {
        format!("{num:.1}")
    } else {
        format!("{num:.2}")
    };

    format!("{formatted}{}", MAGNITUDE_LABELS[magnitude])
}

/// `%g`-style rendering with `digits` significant digits: trailing zeros
/// dropped, scientific notation below 1e-4.
fn significant_digits(num: f64, digits: i32) -> String {
    // Exponent after rounding, so 9.9996e-5 counts as 1.00e-4
    let scientific = format!("{:.*e}", (digits - 1) as usize, num);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs());
    }

    let decimals = (digits - 1 - exponent).max(0) as usize;
    trim_zeros(&format!("{num:.decimals$}")).to_string()
}

fn trim_zeros(value: &str) -> &str {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value
    }
}
