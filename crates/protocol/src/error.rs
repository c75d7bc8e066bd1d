use crate::RecordKind;
use thiserror::Error;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A referenced proposal/vote/topic id does not resolve.
    #[error("Missing ledger record: {kind} {id}")]
    MissingRecord { kind: RecordKind, id: String },

    #[error("Missing chunk: {0}")]
    MissingChunk(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed ledger record {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl LedgerError {
    pub fn missing(kind: RecordKind, id: impl Into<String>) -> Self {
        Self::MissingRecord {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::MissingRecord { .. } | Self::MissingChunk(_))
    }
}
