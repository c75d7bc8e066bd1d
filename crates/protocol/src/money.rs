//! Monetary strings as written in proposal documents (`$1,234.56K`) and the abbreviated form
//! used for summaries (`$1.23M`).

use regex::Regex;
use std::sync::OnceLock;

const SUFFIXES: &[(&str, f64)] = &[
    ("Qui", 1e18),
    ("Qua", 1e15),
    ("T", 1e12),
    ("B", 1e9),
    ("M", 1e6),
    ("K", 1e3),
];

pub const DEFAULT_DECIMALS: usize = 2;

fn currency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$\s?(\d+|\d{1,3}(?:,\d{3})+)(\.\d+)?\s?(Qui|Qua|[KMBTkmbt])?$")
            .unwrap_or_else(|err| unreachable!("currency regex is valid: {err}"))
    })
}

fn multiplier(suffix: &str) -> f64 {
    SUFFIXES
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(suffix))
        .map_or(1.0, |(_, m)| *m)
}

/// Parse `$1,234.56K`-style strings into their base value. Returns `None` when the string is not
/// a dollar amount.
#[must_use]
pub fn parse_currency(raw: &str) -> Option<f64> {
    let caps = currency_regex().captures(raw.trim())?;
    let whole = caps.get(1)?.as_str().replace(',', "");
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    let base: f64 = format!("{whole}{fraction}").parse().ok()?;
    let scale = caps.get(3).map_or(1.0, |m| multiplier(m.as_str()));
    Some(base * scale)
}

/// Abbreviate `value` with K/M/B/T/Qua/Qui suffixes. Values under one thousand keep exactly
/// `decimals` places; abbreviated values drop trailing zeros.
#[must_use]
pub fn abbreviate(value: f64, decimals: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    if value < 1e3 {
        return format!("{value:.decimals$}");
    }
    let (suffix, scale) = SUFFIXES
        .iter()
        .find(|(_, scale)| value >= *scale)
        .copied()
        .unwrap_or(("K", 1e3));
    let scaled = format!("{:.decimals$}", value / scale);
    format!("{}{suffix}", trim_zeros(&scaled))
}

/// `abbreviate` with a leading dollar sign, e.g. `$1.5M`.
#[must_use]
pub fn format_currency(value: f64) -> String {
    format!("${}", abbreviate(value, DEFAULT_DECIMALS))
}

fn trim_zeros(raw: &str) -> &str {
    if raw.contains('.') {
        raw.trim_end_matches('0').trim_end_matches('.')
    } else {
        raw
    }
}
