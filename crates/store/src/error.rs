use govsync_protocol::LedgerError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A chunk read failed. Scratch files for earlier chunks are kept, so a retry resumes.
    #[error("Chunk fetch failed for {root} at index {index}: {source}")]
    ChunkFetchFailed {
        root: String,
        index: usize,
        #[source]
        source: LedgerError,
    },

    /// The chain is longer than the configured bound or revisits a chunk.
    #[error("Corrupt chunk chain {root}: {reason}")]
    CorruptChunkChain { root: String, reason: String },

    #[error("Cache file {} is corrupt: {reason}", path.display())]
    CacheReadCorrupt { path: PathBuf, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether retrying the same operation can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ChunkFetchFailed { .. } | Self::IoError(_))
    }
}
