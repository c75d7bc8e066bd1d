//! # Govsync Rollup
//!
//! Vote views maintained incrementally from individual vote records.
//!
//! ## Update path
//!
//! ```text
//! vote record (+ its proposal)
//!     │
//!     ├──> writer mutex + rollups/rollup.lock
//!     │
//!     ├──> RollupIndexes::apply
//!     │      ├─> new vote       -> topic count + 1
//!     │      ├─> newer vote     -> prior id archived under its proposal
//!     │      ├─> same vote      -> no change
//!     │      └─> older vote     -> archived under its own proposal
//!     │
//!     └──> rollups/*.json (tmp + rename), then a new read snapshot
//! ```

mod error;
mod indexes;
mod lock;
mod store;

pub use error::{Result, RollupError};
pub use indexes::{ApplyOutcome, Disposition, ProposalRef, RollupIndexes, VoteStamp};
pub use store::{
    VoteRollupStore, PROPOSAL_ARCHIVED_VOTES_FILE, PROPOSAL_VOTERS_FILE, PROPOSAL_VOTES_FILE,
    TOPIC_VOTE_COUNTS_FILE, VOTER_TOPIC_VOTES_FILE,
};
