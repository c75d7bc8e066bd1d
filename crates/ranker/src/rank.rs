use crate::taxonomy::{Taxonomy, TopicPriority};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Vote counts in `min_votes..=max_votes` map to `rank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankBand {
    pub rank: u32,
    pub min_votes: u64,
    pub max_votes: u64,
}

impl RankBand {
    const fn new(rank: u32, min_votes: u64, max_votes: u64) -> Self {
        Self {
            rank,
            min_votes,
            max_votes,
        }
    }

    #[must_use]
    pub const fn contains(&self, votes: u64) -> bool {
        votes >= self.min_votes && votes <= self.max_votes
    }
}

const DEFAULT_BANDS: [RankBand; 9] = [
    RankBand::new(10, 0, 0),
    RankBand::new(9, 1, 10),
    RankBand::new(8, 11, 25),
    RankBand::new(7, 26, 50),
    RankBand::new(6, 51, 100),
    RankBand::new(5, 101, 250),
    RankBand::new(4, 251, 500),
    RankBand::new(3, 501, 1_000),
    RankBand::new(2, 1_001, 5_000),
];

/// Under-voted topics get a higher rank. Bands are checked in order; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub bands: Vec<RankBand>,
    /// Rank for counts outside every band.
    pub default_rank: u32,
    /// Priorities are subtracted from this value, so it must exceed the largest priority.
    pub max_priority: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS.to_vec(),
            default_rank: 1,
            max_priority: 11,
        }
    }
}

impl RankingConfig {
    #[must_use]
    pub fn rank_for(&self, votes: u64) -> u32 {
        self.bands
            .iter()
            .find(|band| band.contains(votes))
            .map_or(self.default_rank, |band| band.rank)
    }

    #[must_use]
    pub fn score(&self, priority: u32, rank: u32) -> i64 {
        (i64::from(self.max_priority) - i64::from(priority)) * i64::from(rank)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScore {
    pub topic: String,
    pub priority: u32,
    pub votes: u64,
    pub rank: u32,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    /// Score descending, then priority and vote count ascending.
    pub ranked: Vec<TopicScore>,
    pub winner: Option<TopicScore>,
}

/// Picks the topic for the next voting round.
#[derive(Debug, Clone, Default)]
pub struct TopicRanker {
    config: RankingConfig,
}

impl TopicRanker {
    #[must_use]
    pub const fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &RankingConfig {
        &self.config
    }

    #[must_use]
    pub fn rank<F>(
        &self,
        taxonomy: &Taxonomy,
        vote_counts: &BTreeMap<String, u64>,
        has_proposals: F,
    ) -> Ranking
    where
        F: Fn(&str) -> bool,
    {
        self.rank_topics(&taxonomy.flatten(), vote_counts, has_proposals)
    }

    /// Rank already flattened topics. `topics` order is the final tie-break.
    #[must_use]
    pub fn rank_topics<F>(
        &self,
        topics: &[TopicPriority],
        vote_counts: &BTreeMap<String, u64>,
        has_proposals: F,
    ) -> Ranking
    where
        F: Fn(&str) -> bool,
    {
        let candidates: Vec<TopicScore> = topics
            .iter()
            .filter(|entry| has_proposals(&entry.topic))
            .map(|entry| {
                let votes = vote_counts.get(&entry.topic).copied().unwrap_or(0);
                let rank = self.config.rank_for(votes);
                TopicScore {
                    topic: entry.topic.clone(),
                    priority: entry.priority,
                    votes,
                    rank,
                    score: self.config.score(entry.priority, rank),
                }
            })
            .collect();

        let winner = pick_winner(&candidates);
        match &winner {
            Some(w) => log::debug!(
                "ranked {} topics; winner {} (score {}, priority {}, votes {})",
                candidates.len(),
                w.topic,
                w.score,
                w.priority,
                w.votes
            ),
            None => log::debug!("no topic has proposals; nothing to rank"),
        }

        let mut ranked = candidates;
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.votes.cmp(&b.votes))
        });
        Ranking { ranked, winner }
    }
}

fn pick_winner(candidates: &[TopicScore]) -> Option<TopicScore> {
    let top = candidates.iter().map(|c| c.score).max()?;
    let mut best: Option<&TopicScore> = None;
    for candidate in candidates.iter().filter(|c| c.score == top) {
        best = match best {
            None => Some(candidate),
            Some(current) => match candidate
                .priority
                .cmp(&current.priority)
                .then_with(|| candidate.votes.cmp(&current.votes))
            {
                Ordering::Less => Some(candidate),
                _ => Some(current),
            },
        };
    }
    best.cloned()
}
