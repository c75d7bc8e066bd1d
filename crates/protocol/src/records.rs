use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash referencing one chunk of a chunked ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkRef(pub String);

impl ChunkRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One fragment of a chunked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: Vec<u8>,
    #[serde(default)]
    pub next: Option<ChunkRef>,
}

impl Chunk {
    /// The following chunk, treating an empty reference as the end of the chain.
    #[must_use]
    pub fn next_ref(&self) -> Option<&ChunkRef> {
        self.next.as_ref().filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: String,
    /// Full slash-separated taxonomy path the proposal is filed under.
    pub topic: String,
    /// First chunk of the proposal document.
    pub document: ChunkRef,
    /// Unix seconds.
    pub created_at: u64,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub voter: String,
    pub proposal_id: String,
    pub topic: String,
    pub in_favor: bool,
    #[serde(default)]
    pub custom_amount: Option<String>,
    #[serde(default)]
    pub comment: String,
    /// Unix seconds.
    pub cast_at: u64,
    #[serde(default)]
    pub replaces: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub rater: String,
    pub rating: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub complainer: String,
    pub description: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub complaints: Vec<Complaint>,
}

/// Latest taxonomy version published for a hierarchy area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRecord {
    pub area: String,
    pub version: u32,
    pub document: ChunkRef,
}
