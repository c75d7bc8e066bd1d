//! # Govsync Assembler
//!
//! Proposal views and the [`SyncEngine`] facade that answers queries.
//!
//! ## Data flow
//!
//! ```text
//! Ledger
//!     │
//!     ├──> ChunkStore          (document bytes, fetched once)
//!     │      └─> ProposalSummary::from_yaml
//!     │             └─> DocumentCache (namespace = topic)
//!     │
//!     ├──> VoteRollupStore     (active votes, vote counts)
//!     │
//!     └──> SyncEngine
//!            ├─> assemble_proposal(id)  -> ProposalView
//!            ├─> rank_topics()          -> TopicRanking
//!            └─> prior_vote(voter, topic)
//! ```

mod assembler;
mod document;
mod engine;
mod error;
mod feedback;

pub use assembler::{AssembleOptions, ProposalAssembler, ProposalView, VoteInfo};
pub use document::{theft_by_year, ProposalSummary, NO_DESCRIPTION, NO_TITLE};
pub use engine::{SyncEngine, TopicRanking};
pub use error::{AssemblerError, Result};
pub use feedback::{CitizenFeedback, FeedbackSummary};
