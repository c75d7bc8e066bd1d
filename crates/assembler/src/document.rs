use govsync_protocol::money::{format_currency, parse_currency};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const NO_TITLE: &str = "No Title available";
pub const NO_DESCRIPTION: &str = "No Description available";

fn stolen_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^stolen_(\d+)$")
            .unwrap_or_else(|err| unreachable!("stolen year regex is valid: {err}"))
    })
}

/// Everything derived from a proposal document. Computed once per proposal and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Year -> amount claimed for that year.
    pub theft_years: BTreeMap<u32, f64>,
    pub theft_amount: f64,
    /// Abbreviated total, e.g. `$1.5M`.
    pub summary: String,
    /// The document itself, as JSON.
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl ProposalSummary {
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        let value: Value = serde_yaml::from_slice(bytes)?;
        Ok(Self::from_value(&value))
    }

    /// A document that is not a mapping (including an empty one) yields the defaults.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let empty = Mapping::new();
        let fields = value.as_mapping().unwrap_or(&empty);

        let theft_years = theft_by_year(fields);
        let theft_amount: f64 = theft_years.values().sum();
        let detail = serde_json::to_value(value).unwrap_or_else(|err| {
            log::debug!("proposal document has no JSON form: {err}");
            serde_json::Value::Null
        });

        Self {
            title: text_field(fields, &["title", "Title"]).unwrap_or_else(|| NO_TITLE.to_string()),
            description: text_field(fields, &["describe_problem_area"])
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            author: text_field(fields, &["author"]),
            summary: format_currency(theft_amount),
            theft_years,
            theft_amount,
            detail,
        }
    }
}

/// Amounts from every `stolen_<year>` key. Amounts that do not parse count as zero.
#[must_use]
pub fn theft_by_year(fields: &Mapping) -> BTreeMap<u32, f64> {
    let mut years = BTreeMap::new();
    for (key, value) in fields {
        let Some(key) = key.as_str() else { continue };
        let Some(year) = stolen_year_regex()
            .captures(key)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        let amount = match value {
            Value::String(raw) => parse_currency(raw),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        let amount = amount.unwrap_or_else(|| {
            log::warn!("{key}: amount {value:?} is not a dollar figure; counting it as 0");
            0.0
        });
        *years.entry(year).or_insert(0.0) += amount;
    }
    years
}

fn text_field(fields: &Mapping, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"
Title: Tax loopholes
describe_problem_area: Offshore shelters
author: jane
stolen_2019: "$1,500K"
stolen_2020: "$2.5M"
stolen_notayear: "$9"
"#;

    #[test]
    fn stolen_years_are_summed_and_abbreviated() {
        let summary = ProposalSummary::from_yaml(DOC.as_bytes()).unwrap();
        assert_eq!(summary.title, "Tax loopholes");
        assert_eq!(summary.description, "Offshore shelters");
        assert_eq!(summary.author.as_deref(), Some("jane"));
        assert_eq!(
            summary.theft_years,
            BTreeMap::from([(2019, 1_500_000.0), (2020, 2_500_000.0)])
        );
        assert_eq!(summary.theft_amount, 4_000_000.0);
        assert_eq!(summary.summary, "$4M");
        assert_eq!(summary.detail["author"], "jane");
    }

    #[test]
    fn unparseable_amount_counts_as_zero() {
        let summary =
            ProposalSummary::from_yaml(b"title: t\nstolen_2018: lots\nstolen_2019: \"$10\"\n")
                .unwrap();
        assert_eq!(summary.theft_years, BTreeMap::from([(2018, 0.0), (2019, 10.0)]));
        assert_eq!(summary.summary, "$10.00");
    }

    #[test]
    fn empty_document_gets_placeholders() {
        let summary = ProposalSummary::from_yaml(b"").unwrap();
        assert_eq!(summary.title, NO_TITLE);
        assert_eq!(summary.description, NO_DESCRIPTION);
        assert_eq!(summary.theft_amount, 0.0);
        assert_eq!(summary.summary, "$0");
    }

    #[test]
    fn lowercase_title_wins_over_capitalized() {
        let summary = ProposalSummary::from_yaml(b"title: a\nTitle: b\n").unwrap();
        assert_eq!(summary.title, "a");
    }
}
