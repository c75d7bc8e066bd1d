use crate::assembler::{AssembleOptions, ProposalAssembler, ProposalView};
use crate::feedback::CitizenFeedback;
use crate::{AssemblerError, Result};
use govsync_protocol::{fetch_record, BatchOutcome, Ledger, RecordKind, TaxonomyRecord, VoteRecord};
use govsync_ranker::{Ranking, RankingConfig, Taxonomy, TopicRanker};
use govsync_rollup::{ApplyOutcome, RollupError, VoteRollupStore};
use govsync_store::{ChunkStore, DocumentCache, FetchLimiter, SyncConfig};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Ranking over the topics whose proposal lookup succeeded, plus the topics that failed.
#[derive(Debug, Serialize)]
pub struct TopicRanking {
    #[serde(flatten)]
    pub ranking: Ranking,
    /// `(topic, error)`; these topics are left out of `ranking`.
    #[serde(serialize_with = "govsync_protocol::serialize_failures")]
    pub failed: Vec<(String, AssemblerError)>,
}

impl TopicRanking {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Query facade over one ledger and one local state directory.
pub struct SyncEngine {
    config: SyncConfig,
    ledger: Arc<dyn Ledger>,
    chunks: Arc<ChunkStore>,
    rollup: Arc<VoteRollupStore>,
    assembler: Arc<ProposalAssembler>,
    ranker: TopicRanker,
}

impl SyncEngine {
    /// Build every store from `config`. All ledger fetches share one concurrency budget.
    pub async fn open(config: SyncConfig, ledger: Arc<dyn Ledger>) -> Result<Self> {
        let config = config.validated()?;
        let limiter = FetchLimiter::new(config.fetch_concurrency);
        let chunks = Arc::new(ChunkStore::with_limiter(
            &config,
            Arc::clone(&ledger),
            limiter.clone(),
        ));
        let rollup = Arc::new(
            VoteRollupStore::open(&config, Arc::clone(&ledger))
                .await?
                .with_limiter(limiter),
        );
        let assembler = Arc::new(ProposalAssembler::new(
            Arc::clone(&ledger),
            Arc::clone(&chunks),
            DocumentCache::new(&config),
            Arc::clone(&rollup),
        ));
        log::debug!("sync engine ready at {}", config.home.display());
        Ok(Self {
            config,
            ledger,
            chunks,
            rollup,
            assembler,
            ranker: TopicRanker::default(),
        })
    }

    #[must_use]
    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranker = TopicRanker::new(ranking);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn chunk_store(&self) -> &Arc<ChunkStore> {
        &self.chunks
    }

    #[must_use]
    pub fn rollup(&self) -> &Arc<VoteRollupStore> {
        &self.rollup
    }

    #[must_use]
    pub fn assembler(&self) -> &Arc<ProposalAssembler> {
        &self.assembler
    }

    pub async fn assemble_proposal(&self, id: &str) -> Result<ProposalView> {
        self.assembler.assemble(id).await
    }

    pub async fn assemble_proposal_with(&self, id: &str, options: AssembleOptions) -> Result<ProposalView> {
        self.assembler.assemble_with(id, options).await
    }

    pub async fn assemble_proposals(
        &self,
        ids: Vec<String>,
        options: AssembleOptions,
    ) -> BatchOutcome<ProposalView, AssemblerError> {
        self.assembler.assemble_many(ids, options).await
    }

    pub async fn topic_proposals(&self, topic: &str) -> Result<BatchOutcome<ProposalView, AssemblerError>> {
        self.topic_proposals_with(topic, AssembleOptions::default()).await
    }

    /// Every proposal of `topic`; with [`AssembleOptions::with_vote_info`] each view also carries
    /// its resolved active votes.
    pub async fn topic_proposals_with(
        &self,
        topic: &str,
        options: AssembleOptions,
    ) -> Result<BatchOutcome<ProposalView, AssemblerError>> {
        self.assembler.assemble_topic(topic, options).await
    }

    pub async fn citizen_feedback(&self, proposal_id: &str, citizen: &str) -> Result<CitizenFeedback> {
        self.assembler.citizen_feedback(proposal_id, citizen).await
    }

    /// Latest taxonomy of the configured area.
    pub async fn taxonomy(&self) -> Result<Taxonomy> {
        let area = &self.config.taxonomy_area;
        let record: TaxonomyRecord = fetch_record(&*self.ledger, RecordKind::Taxonomy, area).await?;
        let bytes = self.chunks.fetch_document(&record.document).await?;
        let taxonomy = Taxonomy::from_yaml(&bytes)?;
        log::debug!("taxonomy {area} v{} loaded", record.version);
        Ok(taxonomy)
    }

    /// Rank every candidate topic of the latest taxonomy against the current vote counts.
    ///
    /// A topic whose proposal lookup fails is reported in `failed` and left out of the ranking;
    /// only a taxonomy that cannot be loaded fails the whole call.
    pub async fn rank_topics(&self) -> Result<TopicRanking> {
        let taxonomy = self.taxonomy().await?;
        let topics = taxonomy.flatten();
        let counts = self.rollup.vote_counts();

        let mut with_proposals = HashSet::new();
        let mut failed = Vec::new();
        for entry in &topics {
            match self.topic_has_proposals(&entry.topic).await {
                Ok(true) => {
                    with_proposals.insert(entry.topic.clone());
                }
                Ok(false) => {}
                Err(err) => {
                    log::warn!("topic {} left out of ranking: {err}", entry.topic);
                    failed.push((entry.topic.clone(), err));
                }
            }
        }

        let ranking = self
            .ranker
            .rank_topics(&topics, &counts, |topic| with_proposals.contains(topic));
        if let Some(winner) = &ranking.winner {
            log::info!("next voting area: {} (score {})", winner.topic, winner.score);
        }
        Ok(TopicRanking { ranking, failed })
    }

    async fn topic_has_proposals(&self, topic: &str) -> Result<bool> {
        let mut version = self.ledger.contract_version(RecordKind::Proposal).await?;
        while version > 0 {
            if !self
                .ledger
                .proposal_indices_for_topic(topic, version)
                .await?
                .is_empty()
            {
                return Ok(true);
            }
            version -= 1;
        }
        Ok(false)
    }

    pub async fn prior_vote(&self, voter: &str, topic: &str) -> Result<Option<VoteRecord>> {
        Ok(self.rollup.prior_vote(voter, topic).await?)
    }

    pub async fn apply_vote_index(&self, index: u64) -> Result<ApplyOutcome> {
        Ok(self.rollup.apply_vote_index(index).await?)
    }

    pub async fn sync_votes(&self) -> Result<BatchOutcome<ApplyOutcome, RollupError>> {
        Ok(self.rollup.sync_all().await?)
    }
}
