use govsync_protocol::LedgerError;
use govsync_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RollupError>;

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The rollup write lock could not be taken.
    #[error("Rollup lock: {0}")]
    Lock(String),

    #[error("{0}")]
    Other(String),
}

impl RollupError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Ledger(err) if err.is_not_found())
    }
}
