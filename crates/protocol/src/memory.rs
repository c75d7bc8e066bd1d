use crate::{
    Chunk, ChunkRef, FeedbackRecord, Ledger, LedgerError, LedgerResult, ProposalRecord, RecordId,
    RecordKind, TaxonomyRecord, VoteRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Serializable ledger contents, loaded by the CLI from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Document root reference -> chunk contents in chain order.
    #[serde(default)]
    pub documents: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub proposals: Vec<ProposalRecord>,
    #[serde(default)]
    pub votes: Vec<VoteRecord>,
    /// Proposal id -> feedback.
    #[serde(default)]
    pub feedback: BTreeMap<String, FeedbackRecord>,
    #[serde(default)]
    pub taxonomies: Vec<TaxonomyRecord>,
}

#[derive(Default)]
struct MemoryState {
    chunks: HashMap<String, Chunk>,
    records: HashMap<(RecordKind, String), serde_json::Value>,
    versions: HashMap<RecordKind, u32>,
    indices: HashMap<(RecordKind, u32), Vec<u64>>,
    topic_proposals: HashMap<(String, u32), Vec<u64>>,
    chunk_reads: HashMap<String, usize>,
    record_reads: usize,
    failing_chunks: HashSet<String>,
    failing_topics: HashSet<String>,
}

/// In-process ledger with read counters and failure injection.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> LedgerResult<Self> {
        let ledger = Self::new();
        for (root, parts) in &snapshot.documents {
            let parts: Vec<&[u8]> = parts.iter().map(String::as_bytes).collect();
            ledger.insert_document(root, &parts);
        }
        for proposal in snapshot.proposals {
            ledger.add_proposal(proposal)?;
        }
        for vote in snapshot.votes {
            ledger.add_vote(vote)?;
        }
        for (proposal_id, feedback) in snapshot.feedback {
            ledger.set_feedback(&proposal_id, feedback);
        }
        for taxonomy in snapshot.taxonomies {
            ledger.set_taxonomy(taxonomy);
        }
        Ok(ledger)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store `parts` as a linked chunk chain whose first chunk is `root`.
    pub fn insert_document(&self, root: &str, parts: &[&[u8]]) -> ChunkRef {
        let refs: Vec<String> = (0..parts.len())
            .map(|i| {
                if i == 0 {
                    root.to_string()
                } else {
                    format!("{root}#{i}")
                }
            })
            .collect();
        let mut state = self.lock();
        for (i, part) in parts.iter().enumerate() {
            let next = refs.get(i + 1).map(|r| ChunkRef::new(r.clone()));
            state.chunks.insert(
                refs[i].clone(),
                Chunk {
                    content: part.to_vec(),
                    next,
                },
            );
        }
        ChunkRef::new(root)
    }

    pub fn insert_chunk(&self, chunk_ref: &str, chunk: Chunk) {
        self.lock().chunks.insert(chunk_ref.to_string(), chunk);
    }

    pub fn add_proposal(&self, proposal: ProposalRecord) -> LedgerResult<()> {
        let id = parse_id(&proposal.id)?;
        let value = to_value(&proposal.id, &proposal)?;
        let mut state = self.lock();
        register_index(&mut state, RecordKind::Proposal, &id);
        let topic_indices = state
            .topic_proposals
            .entry((proposal.topic.clone(), id.version))
            .or_default();
        if !topic_indices.contains(&id.index) {
            topic_indices.push(id.index);
        }
        state
            .records
            .insert((RecordKind::Proposal, proposal.id), value);
        Ok(())
    }

    pub fn add_vote(&self, vote: VoteRecord) -> LedgerResult<()> {
        let id = parse_id(&vote.id)?;
        let value = to_value(&vote.id, &vote)?;
        let mut state = self.lock();
        register_index(&mut state, RecordKind::Vote, &id);
        state.records.insert((RecordKind::Vote, vote.id), value);
        Ok(())
    }

    pub fn set_feedback(&self, proposal_id: &str, feedback: FeedbackRecord) {
        let value = serde_json::to_value(&feedback).unwrap_or_default();
        self.lock()
            .records
            .insert((RecordKind::Feedback, proposal_id.to_string()), value);
    }

    /// Publish a taxonomy version. An older version than the one stored for the area is ignored.
    pub fn set_taxonomy(&self, taxonomy: TaxonomyRecord) {
        let value = serde_json::to_value(&taxonomy).unwrap_or_default();
        let mut state = self.lock();
        let key = (RecordKind::Taxonomy, taxonomy.area.clone());
        let stored_version = state
            .records
            .get(&key)
            .and_then(|stored| stored.get("version"))
            .and_then(serde_json::Value::as_u64);
        if stored_version.is_some_and(|stored| stored > u64::from(taxonomy.version)) {
            return;
        }
        let version = state.versions.entry(RecordKind::Taxonomy).or_insert(0);
        *version = (*version).max(taxonomy.version);
        state.records.insert(key, value);
    }

    /// Make every read of `chunk_ref` fail until [`MemoryLedger::heal_chunk`] is called.
    pub fn fail_chunk(&self, chunk_ref: &str) {
        self.lock().failing_chunks.insert(chunk_ref.to_string());
    }

    pub fn heal_chunk(&self, chunk_ref: &str) {
        self.lock().failing_chunks.remove(chunk_ref);
    }

    /// Make proposal lookups for `topic` fail until [`MemoryLedger::heal_topic`] is called.
    pub fn fail_topic(&self, topic: &str) {
        self.lock().failing_topics.insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.lock().failing_topics.remove(topic);
    }

    #[must_use]
    pub fn chunk_reads(&self, chunk_ref: &str) -> usize {
        self.lock().chunk_reads.get(chunk_ref).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_chunk_reads(&self) -> usize {
        self.lock().chunk_reads.values().sum()
    }

    #[must_use]
    pub fn record_reads(&self) -> usize {
        self.lock().record_reads
    }
}

fn parse_id(raw: &str) -> LedgerResult<RecordId> {
    raw.parse::<RecordId>().map_err(|reason| LedgerError::Malformed {
        id: raw.to_string(),
        reason,
    })
}

fn to_value<T: Serialize>(id: &str, record: &T) -> LedgerResult<serde_json::Value> {
    serde_json::to_value(record).map_err(|err| LedgerError::Malformed {
        id: id.to_string(),
        reason: err.to_string(),
    })
}

fn register_index(state: &mut MemoryState, kind: RecordKind, id: &RecordId) {
    let version = state.versions.entry(kind).or_insert(0);
    *version = (*version).max(id.version);
    let indices = state.indices.entry((kind, id.version)).or_default();
    if let Err(pos) = indices.binary_search(&id.index) {
        indices.insert(pos, id.index);
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read_chunk(&self, chunk: &ChunkRef) -> LedgerResult<Chunk> {
        let mut state = self.lock();
        *state.chunk_reads.entry(chunk.0.clone()).or_insert(0) += 1;
        if state.failing_chunks.contains(&chunk.0) {
            return Err(LedgerError::Unavailable(format!(
                "chunk {chunk} read rejected"
            )));
        }
        state
            .chunks
            .get(&chunk.0)
            .cloned()
            .ok_or_else(|| LedgerError::MissingChunk(chunk.0.clone()))
    }

    async fn get_record(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> LedgerResult<Option<serde_json::Value>> {
        let mut state = self.lock();
        state.record_reads += 1;
        Ok(state.records.get(&(kind, id.to_string())).cloned())
    }

    async fn contract_version(&self, kind: RecordKind) -> LedgerResult<u32> {
        Ok(self.lock().versions.get(&kind).copied().unwrap_or(0))
    }

    async fn query_indices_by_cursor(
        &self,
        kind: RecordKind,
        cursor: u64,
        limit: u64,
        version: u32,
    ) -> LedgerResult<Vec<u64>> {
        let state = self.lock();
        let Some(indices) = state.indices.get(&(kind, version)) else {
            return Ok(Vec::new());
        };
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(indices.iter().skip(start).take(limit).copied().collect())
    }

    async fn proposal_indices_for_topic(
        &self,
        topic: &str,
        version: u32,
    ) -> LedgerResult<Vec<u64>> {
        let state = self.lock();
        if state.failing_topics.contains(topic) {
            return Err(LedgerError::Unavailable(format!(
                "proposal lookup for {topic} rejected"
            )));
        }
        Ok(state
            .topic_proposals
            .get(&(topic.to_string(), version))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch_record, list_record_ids};
    use pretty_assertions::assert_eq;

    fn vote(index: u64, version: u32) -> VoteRecord {
        VoteRecord {
            id: RecordId::new(RecordKind::Vote, version, index).to_string(),
            voter: "0xAA".to_string(),
            proposal_id: "ZTMProposal:v1:1".to_string(),
            topic: "USA/Econ".to_string(),
            in_favor: true,
            custom_amount: None,
            comment: String::new(),
            cast_at: index,
            replaces: None,
        }
    }

    #[tokio::test]
    async fn document_chain_links_in_order() {
        let ledger = MemoryLedger::new();
        let root = ledger.insert_document("doc", &[b"AB", b"CD"]);
        let first = ledger.read_chunk(&root).await.unwrap();
        assert_eq!(first.content, b"AB".to_vec());
        let second = ledger.read_chunk(first.next_ref().unwrap()).await.unwrap();
        assert_eq!(second.content, b"CD".to_vec());
        assert!(second.next_ref().is_none());
        assert_eq!(ledger.chunk_reads("doc"), 1);
    }

    #[tokio::test]
    async fn list_record_ids_pages_every_version() {
        let ledger = MemoryLedger::new();
        for index in 1..=5 {
            ledger.add_vote(vote(index, 1)).unwrap();
        }
        for index in 1..=3 {
            ledger.add_vote(vote(index, 2)).unwrap();
        }

        let ids = list_record_ids(&ledger, RecordKind::Vote, 2).await.unwrap();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "ZTMVote:v2:1",
                "ZTMVote:v2:2",
                "ZTMVote:v2:3",
                "ZTMVote:v1:1",
                "ZTMVote:v1:2",
                "ZTMVote:v1:3",
                "ZTMVote:v1:4",
                "ZTMVote:v1:5",
            ]
        );
    }

    #[tokio::test]
    async fn fetch_record_reports_missing_ids() {
        let ledger = MemoryLedger::new();
        let err = fetch_record::<VoteRecord>(&ledger, RecordKind::Vote, "ZTMVote:v1:9")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn failing_chunks_can_be_healed() {
        let ledger = MemoryLedger::new();
        let root = ledger.insert_document("doc", &[b"AB"]);
        ledger.fail_chunk("doc");
        assert!(ledger.read_chunk(&root).await.is_err());
        ledger.heal_chunk("doc");
        assert!(ledger.read_chunk(&root).await.is_ok());
        assert_eq!(ledger.chunk_reads("doc"), 2);
    }

    #[tokio::test]
    async fn older_taxonomy_never_replaces_newer() {
        let ledger = MemoryLedger::new();
        for version in [2, 1] {
            ledger.set_taxonomy(TaxonomyRecord {
                area: "USA".to_string(),
                version,
                document: ChunkRef::new(format!("tax-v{version}")),
            });
        }
        let record: TaxonomyRecord = fetch_record(&ledger, RecordKind::Taxonomy, "USA")
            .await
            .unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.document, ChunkRef::new("tax-v2"));
    }
}
