use crate::document::ProposalSummary;
use crate::feedback::{CitizenFeedback, FeedbackSummary};
use crate::{AssemblerError, Result};
use govsync_protocol::{
    fetch_record, BatchOutcome, ChunkRef, FeedbackRecord, Ledger, LedgerError, ProposalRecord,
    RecordId, RecordKind, VoteRecord,
};
use govsync_rollup::VoteRollupStore;
use govsync_store::{ChunkStore, DocumentCache, FetchLimiter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

/// A proposal as shown to users: ledger fields, cached document summary, live votes and
/// feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalView {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub created_at: u64,
    /// Root chunk of the proposal document.
    pub document: ChunkRef,
    #[serde(flatten)]
    pub summary: ProposalSummary,
    /// Active vote ids. Never cached.
    pub votes: Vec<String>,
    pub feedback: FeedbackSummary,
    /// Present only when requested through [`AssembleOptions::with_vote_info`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_info: Option<Vec<VoteInfo>>,
}

/// One active vote, resolved from its ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub vote_id: String,
    pub voter: String,
    pub in_favor: bool,
    /// The voter's own theft figures, decoded from the vote's JSON override. Empty when the
    /// vote carries none.
    pub custom_amount: serde_json::Value,
    pub proposal_id: String,
    pub topic: String,
    /// Years the proposal claims theft for.
    pub voted_years: Vec<u32>,
}

impl VoteInfo {
    fn from_record(vote: VoteRecord, voted_years: Vec<u32>) -> Self {
        let custom_amount = decode_custom_amount(&vote);
        Self {
            vote_id: vote.id,
            voter: vote.voter,
            in_favor: vote.in_favor,
            custom_amount,
            proposal_id: vote.proposal_id,
            topic: vote.topic,
            voted_years,
        }
    }
}

/// A missing or blank override is an empty object; one that is not JSON is logged and
/// treated the same way.
fn decode_custom_amount(vote: &VoteRecord) -> serde_json::Value {
    let empty = || serde_json::Value::Object(serde_json::Map::new());
    let Some(raw) = vote.custom_amount.as_deref().map(str::trim) else {
        return empty();
    };
    if raw.is_empty() {
        return empty();
    }
    serde_json::from_str(raw).unwrap_or_else(|err| {
        log::warn!("vote {}: custom amount is not JSON ({err}); ignoring it", vote.id);
        empty()
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Resolve every active vote into a [`VoteInfo`].
    pub with_vote_info: bool,
}

impl AssembleOptions {
    #[must_use]
    pub const fn with_vote_info() -> Self {
        Self {
            with_vote_info: true,
        }
    }
}

pub struct ProposalAssembler {
    ledger: Arc<dyn Ledger>,
    chunks: Arc<ChunkStore>,
    cache: DocumentCache,
    rollup: Arc<VoteRollupStore>,
    limiter: FetchLimiter,
}

impl ProposalAssembler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        chunks: Arc<ChunkStore>,
        cache: DocumentCache,
        rollup: Arc<VoteRollupStore>,
    ) -> Self {
        let limiter = chunks.limiter().clone();
        Self {
            ledger,
            chunks,
            cache,
            rollup,
            limiter,
        }
    }

    pub async fn assemble(&self, id: &str) -> Result<ProposalView> {
        self.assemble_with(id, AssembleOptions::default()).await
    }

    pub async fn assemble_with(&self, id: &str, options: AssembleOptions) -> Result<ProposalView> {
        let record: ProposalRecord = fetch_record(&*self.ledger, RecordKind::Proposal, id).await?;
        let summary = self.summary(&record).await?;
        let feedback = FeedbackSummary::from_record(&self.feedback_record(id).await?);
        let votes = self.rollup.active_votes(&record.id);
        let vote_info = if options.with_vote_info {
            Some(self.vote_info(&votes, &summary).await?)
        } else {
            None
        };
        Ok(ProposalView {
            id: record.id,
            topic: record.topic,
            owner: record.owner,
            created_at: record.created_at,
            document: record.document,
            summary,
            votes,
            feedback,
            vote_info,
        })
    }

    /// Document-derived fields, cached per topic namespace.
    async fn summary(&self, record: &ProposalRecord) -> Result<ProposalSummary> {
        self.cache
            .get_or_compute(&record.topic, &record.id, || async {
                let bytes = self.chunks.fetch_document(&record.document).await?;
                ProposalSummary::from_yaml(&bytes).map_err(|err| AssemblerError::InvalidDocument {
                    id: record.id.clone(),
                    reason: err.to_string(),
                })
            })
            .await
    }

    /// Votes are read one after another: batch callers already hold a fetch permit per
    /// proposal.
    async fn vote_info(&self, votes: &[String], summary: &ProposalSummary) -> Result<Vec<VoteInfo>> {
        let voted_years: Vec<u32> = summary.theft_years.keys().copied().collect();
        let mut info = Vec::with_capacity(votes.len());
        for vote_id in votes {
            let vote: VoteRecord = fetch_record(&*self.ledger, RecordKind::Vote, vote_id).await?;
            info.push(VoteInfo::from_record(vote, voted_years.clone()));
        }
        Ok(info)
    }

    /// A proposal nobody has rated or complained about has no feedback record.
    async fn feedback_record(&self, id: &str) -> Result<FeedbackRecord> {
        let Some(value) = self.ledger.get_record(RecordKind::Feedback, id).await? else {
            return Ok(FeedbackRecord::default());
        };
        let record = serde_json::from_value(value).map_err(|err| LedgerError::Malformed {
            id: id.to_string(),
            reason: err.to_string(),
        })?;
        Ok(record)
    }

    /// One citizen's rating and complaints on `proposal_id`.
    pub async fn citizen_feedback(&self, proposal_id: &str, citizen: &str) -> Result<CitizenFeedback> {
        let _: ProposalRecord =
            fetch_record(&*self.ledger, RecordKind::Proposal, proposal_id).await?;
        let record = self.feedback_record(proposal_id).await?;
        Ok(CitizenFeedback::from_record(proposal_id, citizen, &record))
    }

    /// Assemble several proposals concurrently. Results keep the input order; a failing
    /// proposal is reported and does not stop the others.
    pub async fn assemble_many(
        self: &Arc<Self>,
        ids: Vec<String>,
        options: AssembleOptions,
    ) -> BatchOutcome<ProposalView, AssemblerError> {
        let mut tasks = JoinSet::new();
        for (position, id) in ids.iter().cloned().enumerate() {
            let assembler = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = assembler.limiter.acquire().await;
                (position, assembler.assemble_with(&id, options).await)
            });
        }

        let mut results: Vec<Option<Result<ProposalView>>> = ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, result)) => results[position] = Some(result),
                Err(err) => log::error!("proposal assembly task failed: {err}"),
            }
        }

        let mut outcome = BatchOutcome::new();
        for (id, result) in ids.into_iter().zip(results) {
            let result = result.unwrap_or_else(|| {
                Err(AssemblerError::Other(format!("assembly of {id} did not complete")))
            });
            if let Err(err) = &result {
                log::warn!("proposal {id} skipped: {err}");
            }
            outcome.record(id, result);
        }
        outcome
    }

    /// Ids of every proposal filed under `topic`, newest contract version first.
    pub async fn proposals_for_topic(&self, topic: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut version = self.ledger.contract_version(RecordKind::Proposal).await?;
        while version > 0 {
            let indices = self.ledger.proposal_indices_for_topic(topic, version).await?;
            ids.extend(
                indices
                    .into_iter()
                    .map(|index| RecordId::new(RecordKind::Proposal, version, index).to_string()),
            );
            version -= 1;
        }
        Ok(ids)
    }

    pub async fn assemble_topic(
        self: &Arc<Self>,
        topic: &str,
        options: AssembleOptions,
    ) -> Result<BatchOutcome<ProposalView, AssemblerError>> {
        let ids = self.proposals_for_topic(topic).await?;
        log::info!("assembling {} proposals for {topic}", ids.len());
        Ok(self.assemble_many(ids, options).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vote(custom_amount: Option<&str>) -> VoteRecord {
        VoteRecord {
            id: "ZTMVote:v1:1".into(),
            voter: "0xaa".into(),
            proposal_id: "ZTMProposal:v1:1".into(),
            topic: "Econ/Tax".into(),
            in_favor: false,
            custom_amount: custom_amount.map(str::to_string),
            comment: String::new(),
            cast_at: 1,
            replaces: None,
        }
    }

    #[test]
    fn custom_amount_is_decoded_from_json() {
        let info = VoteInfo::from_record(vote(Some(r#"{"2019": "$2M"}"#)), vec![2019]);
        assert_eq!(info.custom_amount, serde_json::json!({"2019": "$2M"}));
        assert!(!info.in_favor);
        assert_eq!(info.voted_years, vec![2019]);
    }

    #[test]
    fn absent_blank_or_broken_custom_amount_is_empty() {
        let empty = serde_json::json!({});
        for raw in [None, Some(""), Some("  "), Some("{not json")] {
            assert_eq!(VoteInfo::from_record(vote(raw), Vec::new()).custom_amount, empty);
        }
    }
}
