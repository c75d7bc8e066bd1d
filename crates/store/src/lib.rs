//! # Govsync Store
//!
//! Local persistence for data pulled off the ledger.
//!
//! ## Layout
//!
//! ```text
//! <home>/
//!     ├──> chunks/scratch/<root>/<index>.json    (in-progress chain, resumable)
//!     ├──> chunks/documents/<root>.bin           (reassembled document bytes)
//!     └──> documents/<namespace>.json            (keyed summaries, DocumentCache)
//! ```
//!
//! [`ChunkStore`] turns a chunk chain into document bytes, reading each chunk from the
//! ledger at most once across restarts. [`DocumentCache`] keeps keyed JSON values
//! computed from those documents so they survive process restarts.

mod chunk_store;
mod config;
mod document_cache;
mod error;
pub mod json_io;
mod limits;

pub use chunk_store::ChunkStore;
pub use config::{SyncConfig, FETCH_CONCURRENCY_ENV, HOME_ENV, MAX_FETCH_CONCURRENCY};
pub use document_cache::DocumentCache;
pub use error::{Result, StoreError};
pub use json_io::{file_stem_for_key, read_json, read_json_or_default, write_json_atomic};
pub use limits::{FetchConcurrencySnapshot, FetchLimiter, FetchPermit};
