use crate::indexes::{ApplyOutcome, Disposition, ProposalRef, RollupIndexes};
use crate::lock::acquire_rollup_write_lock;
use crate::{Result, RollupError};
use govsync_protocol::{
    fetch_record, list_record_ids, BatchOutcome, Ledger, LedgerResult, ProposalRecord, RecordId,
    RecordKind, VoteRecord,
};
use govsync_store::{read_json_or_default, write_json_atomic, FetchLimiter, SyncConfig};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinSet;

pub const VOTER_TOPIC_VOTES_FILE: &str = "voter_topic_votes.json";
pub const PROPOSAL_VOTES_FILE: &str = "proposal_votes.json";
pub const PROPOSAL_ARCHIVED_VOTES_FILE: &str = "proposal_archived_votes.json";
pub const TOPIC_VOTE_COUNTS_FILE: &str = "topic_vote_counts.json";
pub const PROPOSAL_VOTERS_FILE: &str = "proposal_voters.json";

/// Vote rollup indexes persisted under `<home>/rollups`.
///
/// Writers are serialized in-process by a mutex and across processes by `rollup.lock`.
/// Readers work on an immutable snapshot and never wait for a writer.
pub struct VoteRollupStore {
    ledger: Arc<dyn Ledger>,
    dir: PathBuf,
    page_size: u64,
    limiter: FetchLimiter,
    indexes: RwLock<Arc<RollupIndexes>>,
    writer: TokioMutex<()>,
}

impl VoteRollupStore {
    /// Load whatever indexes exist on disk; absent files start empty.
    pub async fn open(config: &SyncConfig, ledger: Arc<dyn Ledger>) -> Result<Self> {
        let dir = config.rollup_dir();
        let indexes = load_indexes(&dir).await?;
        log::info!(
            "rollup indexes loaded from {}: {} voters, {} topics",
            dir.display(),
            indexes.voter_topic_votes.len(),
            indexes.topic_vote_counts.len()
        );
        Ok(Self {
            ledger,
            dir,
            page_size: config.page_size,
            limiter: FetchLimiter::new(config.fetch_concurrency),
            indexes: RwLock::new(Arc::new(indexes)),
            writer: TokioMutex::new(()),
        })
    }

    /// Share a fetch budget with other components.
    #[must_use]
    pub fn with_limiter(mut self, limiter: FetchLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RollupIndexes> {
        self.indexes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, indexes: RollupIndexes) {
        *self
            .indexes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(indexes);
    }

    /// Re-read the indexes from disk, picking up writes made by other processes.
    pub async fn reload(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.publish(load_indexes(&self.dir).await?);
        Ok(())
    }

    /// Fold one vote into the indexes and persist them.
    pub async fn apply_vote(&self, vote: &VoteRecord, proposal: &ProposalRef) -> Result<ApplyOutcome> {
        let _writer = self.writer.lock().await;
        let _lock = acquire_rollup_write_lock(&self.dir).await?;
        let mut indexes = load_indexes(&self.dir).await?;
        let outcome = self.apply_locked(&mut indexes, vote, proposal).await?;
        if outcome.changed() {
            persist_indexes(&self.dir, &indexes).await?;
        }
        self.publish(indexes);
        Ok(outcome)
    }

    /// Apply the vote at `index` of the current vote contract version.
    pub async fn apply_vote_index(&self, index: u64) -> Result<ApplyOutcome> {
        let version = self.ledger.contract_version(RecordKind::Vote).await?;
        let vote_id = RecordId::new(RecordKind::Vote, version, index).to_string();
        let vote: VoteRecord = fetch_record(&*self.ledger, RecordKind::Vote, &vote_id).await?;
        let proposal: ProposalRecord =
            fetch_record(&*self.ledger, RecordKind::Proposal, &vote.proposal_id).await?;
        self.apply_vote(
            &vote,
            &ProposalRef {
                id: proposal.id,
                topic: proposal.topic,
            },
        )
        .await
    }

    /// Rebuild from the ledger: every vote of every contract version, applied in cast order.
    ///
    /// A vote whose record (or proposal) cannot be read is reported and skipped. The indexes
    /// are written once, after the whole batch.
    pub async fn sync_all(&self) -> Result<BatchOutcome<ApplyOutcome, RollupError>> {
        let ids: Vec<String> = list_record_ids(&*self.ledger, RecordKind::Vote, self.page_size)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect();
        log::info!("syncing {} votes", ids.len());

        let mut outcome: BatchOutcome<ApplyOutcome, RollupError> = BatchOutcome::new();
        let mut votes = Vec::with_capacity(ids.len());
        for (id, result) in self.fetch_all::<VoteRecord>(RecordKind::Vote, ids).await {
            match result {
                Ok(vote) => votes.push(vote),
                Err(err) => outcome.record(id, Err(RollupError::from(err))),
            }
        }

        let proposal_ids: Vec<String> = votes
            .iter()
            .map(|vote| vote.proposal_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let proposals: HashMap<String, LedgerResult<ProposalRecord>> = self
            .fetch_all(RecordKind::Proposal, proposal_ids)
            .await
            .into_iter()
            .collect();

        votes.sort_by(|a, b| a.cast_at.cmp(&b.cast_at).then_with(|| a.id.cmp(&b.id)));

        let _writer = self.writer.lock().await;
        let _lock = acquire_rollup_write_lock(&self.dir).await?;
        let mut indexes = load_indexes(&self.dir).await?;
        let mut changed = false;
        for vote in votes {
            let proposal = match proposals.get(&vote.proposal_id) {
                Some(Ok(record)) => ProposalRef {
                    id: record.id.clone(),
                    topic: record.topic.clone(),
                },
                Some(Err(err)) => {
                    outcome.record(vote.id.clone(), Err(RollupError::from(err.clone())));
                    continue;
                }
                None => {
                    outcome.record(
                        vote.id.clone(),
                        Err(RollupError::Other(format!(
                            "proposal {} was not fetched",
                            vote.proposal_id
                        ))),
                    );
                    continue;
                }
            };
            match self.apply_locked(&mut indexes, &vote, &proposal).await {
                Ok(applied) => {
                    changed |= applied.changed();
                    outcome.record(vote.id.clone(), Ok(applied));
                }
                Err(err) => outcome.record(vote.id.clone(), Err(err)),
            }
        }
        if changed {
            persist_indexes(&self.dir, &indexes).await?;
        }
        self.publish(indexes);

        log::info!(
            "vote sync finished: {} applied, {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    async fn apply_locked(
        &self,
        indexes: &mut RollupIndexes,
        vote: &VoteRecord,
        proposal: &ProposalRef,
    ) -> Result<ApplyOutcome> {
        let prior_owner = match indexes.disposition(vote, &proposal.topic) {
            Disposition::Replaces(prior) => {
                let prior_vote: VoteRecord =
                    fetch_record(&*self.ledger, RecordKind::Vote, &prior.vote_id).await?;
                Some(prior_vote.proposal_id)
            }
            _ => None,
        };
        let outcome = indexes.apply(vote, proposal, prior_owner.as_deref());
        log::debug!("rollup {}: {outcome:?}", proposal.topic);
        Ok(outcome)
    }

    async fn fetch_all<T>(&self, kind: RecordKind, ids: Vec<String>) -> Vec<(String, LedgerResult<T>)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (position, id) in ids.iter().cloned().enumerate() {
            let ledger = Arc::clone(&self.ledger);
            let limiter = self.limiter.clone();
            tasks.spawn(async move {
                let _permit = limiter.acquire().await;
                (position, fetch_record::<T>(&*ledger, kind, &id).await)
            });
        }

        let mut results: Vec<Option<LedgerResult<T>>> = ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, result)) => results[position] = Some(result),
                Err(err) => log::error!("{kind} fetch task failed: {err}"),
            }
        }
        ids.into_iter()
            .zip(results)
            .map(|(id, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(govsync_protocol::LedgerError::Other(format!(
                        "fetch task for {id} did not complete"
                    )))
                });
                (id, result)
            })
            .collect()
    }

    /// The voter's active vote on `topic`, read back from the ledger.
    pub async fn prior_vote(&self, voter: &str, topic: &str) -> Result<Option<VoteRecord>> {
        let Some(stamp) = self.snapshot().prior(voter, topic).cloned() else {
            return Ok(None);
        };
        let vote = fetch_record(&*self.ledger, RecordKind::Vote, &stamp.vote_id).await?;
        Ok(Some(vote))
    }

    #[must_use]
    pub fn active_votes(&self, proposal_id: &str) -> Vec<String> {
        set_members(&self.snapshot().proposal_votes, proposal_id)
    }

    #[must_use]
    pub fn archived_votes(&self, proposal_id: &str) -> Vec<String> {
        set_members(&self.snapshot().proposal_archived_votes, proposal_id)
    }

    #[must_use]
    pub fn voters(&self, proposal_id: &str) -> Vec<String> {
        set_members(&self.snapshot().proposal_voters, proposal_id)
    }

    #[must_use]
    pub fn vote_count(&self, topic: &str) -> u64 {
        self.snapshot().vote_count(topic)
    }

    #[must_use]
    pub fn vote_counts(&self) -> BTreeMap<String, u64> {
        self.snapshot().topic_vote_counts.clone()
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn set_members(map: &BTreeMap<String, BTreeSet<String>>, key: &str) -> Vec<String> {
    map.get(key)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

async fn load_indexes(dir: &Path) -> Result<RollupIndexes> {
    Ok(RollupIndexes {
        voter_topic_votes: read_json_or_default(&dir.join(VOTER_TOPIC_VOTES_FILE)).await?,
        proposal_votes: read_json_or_default(&dir.join(PROPOSAL_VOTES_FILE)).await?,
        proposal_archived_votes: read_json_or_default(&dir.join(PROPOSAL_ARCHIVED_VOTES_FILE))
            .await?,
        topic_vote_counts: read_json_or_default(&dir.join(TOPIC_VOTE_COUNTS_FILE)).await?,
        proposal_voters: read_json_or_default(&dir.join(PROPOSAL_VOTERS_FILE)).await?,
    })
}

async fn persist_indexes(dir: &Path, indexes: &RollupIndexes) -> Result<()> {
    write_json_atomic(&dir.join(VOTER_TOPIC_VOTES_FILE), &indexes.voter_topic_votes).await?;
    write_json_atomic(&dir.join(PROPOSAL_VOTES_FILE), &indexes.proposal_votes).await?;
    write_json_atomic(
        &dir.join(PROPOSAL_ARCHIVED_VOTES_FILE),
        &indexes.proposal_archived_votes,
    )
    .await?;
    write_json_atomic(&dir.join(TOPIC_VOTE_COUNTS_FILE), &indexes.topic_vote_counts).await?;
    write_json_atomic(&dir.join(PROPOSAL_VOTERS_FILE), &indexes.proposal_voters).await?;
    Ok(())
}
