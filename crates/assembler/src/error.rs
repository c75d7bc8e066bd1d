use govsync_protocol::LedgerError;
use govsync_ranker::RankerError;
use govsync_rollup::RollupError;
use govsync_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssemblerError>;

#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Rollup error: {0}")]
    Rollup(#[from] RollupError),

    #[error("Ranker error: {0}")]
    Ranker(#[from] RankerError),

    /// The proposal document bytes are not a readable YAML document.
    #[error("Proposal document {id} is invalid: {reason}")]
    InvalidDocument { id: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl AssemblerError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Ledger(err) => err.is_not_found(),
            Self::Rollup(err) => err.is_not_found(),
            Self::Store(StoreError::Ledger(err)) => err.is_not_found(),
            _ => false,
        }
    }
}
