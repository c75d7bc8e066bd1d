//! # Govsync Ranker
//!
//! Chooses the topic for the next voting round.
//!
//! ## Pipeline
//!
//! ```text
//! taxonomy YAML
//!     │
//!     ├──> Taxonomy::from_yaml      (immutable tree, one per version)
//!     │
//!     ├──> Taxonomy::flatten        (leaves + aggregation points, pre-order)
//!     │
//!     └──> TopicRanker::rank
//!            ├─> drop topics without proposals
//!            ├─> vote count -> rank band
//!            ├─> score = (max_priority - priority) * rank
//!            └─> winner: top score, then priority, then votes, then order
//! ```
//!
//! Ranking is pure; callers gather vote counts and proposal presence beforehand.

mod error;
mod rank;
mod taxonomy;

pub use error::{RankerError, Result};
pub use rank::{RankBand, Ranking, RankingConfig, TopicRanker, TopicScore};
pub use taxonomy::{Taxonomy, TopicNode, TopicPriority};
