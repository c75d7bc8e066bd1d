//! # Govsync Protocol
//!
//! Shared vocabulary for every govsync crate: record ids, the records read from
//! the governance ledger, and the [`Ledger`] capability itself.
//!
//! ## Layout
//!
//! ```text
//! Ledger (external, slow, rate-limited)
//!     │
//!     ├──> read_chunk(ref)            -> Chunk { content, next }
//!     ├──> get_record(kind, id)       -> JSON fields
//!     ├──> contract_version(kind)     -> u32
//!     ├──> query_indices_by_cursor()  -> page of indices
//!     └──> proposal_indices_for_topic -> indices
//! ```
//!
//! [`MemoryLedger`] is a complete in-process implementation used by tests and by
//! the CLI when it replays a ledger snapshot file.

mod batch;
mod error;
mod ids;
mod ledger;
mod memory;
pub mod money;
mod records;

pub use batch::{serialize_failures, BatchOutcome};
pub use error::{LedgerError, LedgerResult};
pub use ids::{normalize_address, RecordId, RecordKind};
pub use ledger::{fetch_record, list_record_ids, Ledger};
pub use memory::{LedgerSnapshot, MemoryLedger};
pub use records::{
    Chunk, ChunkRef, Complaint, FeedbackRecord, ProposalRecord, Rating, TaxonomyRecord,
    VoteRecord,
};
