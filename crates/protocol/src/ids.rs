use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contract families stored on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Proposal,
    Vote,
    Feedback,
    Taxonomy,
}

impl RecordKind {
    /// Contract identifier used as the first segment of record ids.
    #[must_use]
    pub const fn contract_identifier(self) -> &'static str {
        match self {
            Self::Proposal => "ZTMProposal",
            Self::Vote => "ZTMVote",
            Self::Feedback => "ZTMFeedback",
            Self::Taxonomy => "ZTMEconomicHierarchy",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Vote => "vote",
            Self::Feedback => "feedback",
            Self::Taxonomy => "taxonomy",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite `{contract}:v{version}:{index}` id of a proposal or vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub contract: String,
    pub version: u32,
    pub index: u64,
}

impl RecordId {
    pub fn new(kind: RecordKind, version: u32, index: u64) -> Self {
        Self {
            contract: kind.contract_identifier().to_string(),
            version,
            index,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}:{}", self.contract, self.version, self.index)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.trim().rsplitn(3, ':');
        let index = parts
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| format!("record id {raw:?} has no numeric index"))?;
        let version = parts
            .next()
            .map(|v| v.strip_prefix('v').unwrap_or(v))
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| format!("record id {raw:?} has no version"))?;
        let contract = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| format!("record id {raw:?} has no contract"))?;
        Ok(Self {
            contract: contract.to_string(),
            version,
            index,
        })
    }
}

/// Voter addresses are compared case-insensitively everywhere.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_display_and_parse_agree() {
        let id = RecordId::new(RecordKind::Vote, 3, 42);
        assert_eq!(id.to_string(), "ZTMVote:v3:42");
        assert_eq!("ZTMVote:v3:42".parse::<RecordId>().unwrap(), id);
    }

    #[test]
    fn record_id_accepts_bare_version() {
        let id: RecordId = "ZTMProposal:2:7".parse().unwrap();
        assert_eq!(id.version, 2);
        assert_eq!(id.index, 7);
    }

    #[test]
    fn record_id_rejects_garbage() {
        assert!("ZTMVote:vx:1".parse::<RecordId>().is_err());
        assert!("1".parse::<RecordId>().is_err());
        assert!(":v1:1".parse::<RecordId>().is_err());
    }

    #[test]
    fn addresses_are_lowercased() {
        assert_eq!(normalize_address(" 0xABcD "), "0xabcd");
    }
}
