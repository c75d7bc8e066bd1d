use govsync_protocol::{normalize_address, VoteRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The vote a voter currently has active on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStamp {
    pub vote_id: String,
    pub cast_at: u64,
}

/// The proposal a vote is applied against. `topic` is authoritative for the rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRef {
    pub id: String,
    pub topic: String,
}

/// What applying one vote did to the indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// First vote of this voter on the topic; the topic count grew by one.
    New { vote_id: String },
    /// The voter's previous vote on the topic moved to the archive.
    Replaced { vote_id: String, archived: String },
    /// The vote is already the active one.
    Duplicate { vote_id: String },
    /// A newer vote of the same voter on the topic is already active; this one was archived.
    Stale { vote_id: String },
}

impl ApplyOutcome {
    #[must_use]
    pub fn vote_id(&self) -> &str {
        match self {
            Self::New { vote_id }
            | Self::Replaced { vote_id, .. }
            | Self::Duplicate { vote_id }
            | Self::Stale { vote_id } => vote_id,
        }
    }

    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::Duplicate { .. })
    }
}

/// How a vote relates to the voter's active vote on the same topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    New,
    Duplicate,
    Stale,
    Replaces(VoteStamp),
}

/// Materialized vote views, keyed by lowercase voter address or by record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupIndexes {
    /// voter -> topic -> active vote.
    pub voter_topic_votes: BTreeMap<String, BTreeMap<String, VoteStamp>>,
    /// proposal -> active vote ids.
    pub proposal_votes: BTreeMap<String, BTreeSet<String>>,
    /// proposal -> superseded vote ids.
    pub proposal_archived_votes: BTreeMap<String, BTreeSet<String>>,
    /// topic -> new (non-replacement) votes cast. Never decreases.
    pub topic_vote_counts: BTreeMap<String, u64>,
    /// proposal -> every voter that ever voted on it.
    pub proposal_voters: BTreeMap<String, BTreeSet<String>>,
}

impl RollupIndexes {
    #[must_use]
    pub fn prior(&self, voter: &str, topic: &str) -> Option<&VoteStamp> {
        self.voter_topic_votes
            .get(&normalize_address(voter))
            .and_then(|topics| topics.get(topic))
    }

    #[must_use]
    pub fn disposition(&self, vote: &VoteRecord, topic: &str) -> Disposition {
        match self.prior(&vote.voter, topic) {
            None => Disposition::New,
            Some(prior) if prior.vote_id == vote.id => Disposition::Duplicate,
            Some(prior) if prior.cast_at < vote.cast_at => Disposition::Replaces(prior.clone()),
            Some(_) => Disposition::Stale,
        }
    }

    /// Apply one vote.
    ///
    /// `prior_proposal` is the proposal the replaced vote was cast on, as resolved by the
    /// caller. When it is `None` the prior id is looked up in the active sets instead.
    pub fn apply(
        &mut self,
        vote: &VoteRecord,
        proposal: &ProposalRef,
        prior_proposal: Option<&str>,
    ) -> ApplyOutcome {
        let voter = normalize_address(&vote.voter);
        let topic = proposal.topic.as_str();

        let outcome = match self.disposition(vote, topic) {
            Disposition::Duplicate => {
                return ApplyOutcome::Duplicate {
                    vote_id: vote.id.clone(),
                }
            }
            Disposition::Stale => {
                if let Some(active) = self.proposal_votes.get_mut(&proposal.id) {
                    active.remove(&vote.id);
                }
                self.proposal_archived_votes
                    .entry(proposal.id.clone())
                    .or_default()
                    .insert(vote.id.clone());
                return ApplyOutcome::Stale {
                    vote_id: vote.id.clone(),
                };
            }
            Disposition::Replaces(prior) => {
                let owner = prior_proposal
                    .map(str::to_string)
                    .or_else(|| self.active_owner(&prior.vote_id));
                match owner {
                    Some(owner) => self.archive(&owner, &prior.vote_id),
                    None => log::warn!(
                        "replaced vote {} is not active on any proposal; nothing to archive",
                        prior.vote_id
                    ),
                }
                ApplyOutcome::Replaced {
                    vote_id: vote.id.clone(),
                    archived: prior.vote_id,
                }
            }
            Disposition::New => {
                *self
                    .topic_vote_counts
                    .entry(topic.to_string())
                    .or_insert(0) += 1;
                ApplyOutcome::New {
                    vote_id: vote.id.clone(),
                }
            }
        };

        self.voter_topic_votes
            .entry(voter.clone())
            .or_default()
            .insert(
                topic.to_string(),
                VoteStamp {
                    vote_id: vote.id.clone(),
                    cast_at: vote.cast_at,
                },
            );
        self.proposal_votes
            .entry(proposal.id.clone())
            .or_default()
            .insert(vote.id.clone());
        self.proposal_voters
            .entry(proposal.id.clone())
            .or_default()
            .insert(voter);
        outcome
    }

    fn active_owner(&self, vote_id: &str) -> Option<String> {
        self.proposal_votes
            .iter()
            .find(|(_, votes)| votes.contains(vote_id))
            .map(|(proposal, _)| proposal.clone())
    }

    fn archive(&mut self, proposal: &str, vote_id: &str) {
        if let Some(active) = self.proposal_votes.get_mut(proposal) {
            active.remove(vote_id);
            if active.is_empty() {
                self.proposal_votes.remove(proposal);
            }
        }
        self.proposal_archived_votes
            .entry(proposal.to_string())
            .or_default()
            .insert(vote_id.to_string());
    }

    #[must_use]
    pub fn vote_count(&self, topic: &str) -> u64 {
        self.topic_vote_counts.get(topic).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn vote(id: &str, voter: &str, proposal: &str, cast_at: u64) -> VoteRecord {
        VoteRecord {
            id: id.to_string(),
            voter: voter.to_string(),
            proposal_id: proposal.to_string(),
            topic: "USA/Econ".to_string(),
            in_favor: true,
            custom_amount: None,
            comment: String::new(),
            cast_at,
            replaces: None,
        }
    }

    fn proposal(id: &str, topic: &str) -> ProposalRef {
        ProposalRef {
            id: id.to_string(),
            topic: topic.to_string(),
        }
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn replacement_moves_prior_vote_to_archive() {
        let mut idx = RollupIndexes::default();
        let p1 = proposal("P1", "USA/Econ");
        let p2 = proposal("P2", "USA/Econ");

        let first = idx.apply(&vote("V1", "0xAA", "P1", 10), &p1, None);
        assert_eq!(first, ApplyOutcome::New { vote_id: "V1".into() });

        let second = idx.apply(&vote("V2", "0xaa", "P2", 20), &p2, Some("P1"));
        assert_eq!(
            second,
            ApplyOutcome::Replaced {
                vote_id: "V2".into(),
                archived: "V1".into()
            }
        );
        assert_eq!(idx.proposal_votes.get("P1"), None);
        assert_eq!(idx.proposal_votes["P2"], set(&["V2"]));
        assert_eq!(idx.proposal_archived_votes["P1"], set(&["V1"]));
        assert_eq!(idx.vote_count("USA/Econ"), 1);
        assert_eq!(idx.prior("0xAA", "USA/Econ").unwrap().vote_id, "V2");
        assert_eq!(idx.proposal_voters["P1"], set(&["0xaa"]));
        assert_eq!(idx.proposal_voters["P2"], set(&["0xaa"]));
    }

    #[test]
    fn duplicate_delivery_changes_nothing() {
        let mut idx = RollupIndexes::default();
        let p1 = proposal("P1", "USA/Econ");
        let v = vote("V1", "0xAA", "P1", 10);
        idx.apply(&v, &p1, None);
        let before = idx.clone();
        assert_eq!(
            idx.apply(&v, &p1, None),
            ApplyOutcome::Duplicate { vote_id: "V1".into() }
        );
        assert_eq!(idx, before);
    }

    #[test]
    fn stale_delivery_is_archived_under_its_own_proposal() {
        let mut idx = RollupIndexes::default();
        let p1 = proposal("P1", "USA/Econ");
        let p2 = proposal("P2", "USA/Econ");
        idx.apply(&vote("V2", "0xAA", "P2", 20), &p2, None);

        let outcome = idx.apply(&vote("V1", "0xAA", "P1", 10), &p1, None);
        assert_eq!(outcome, ApplyOutcome::Stale { vote_id: "V1".into() });
        assert_eq!(idx.prior("0xaa", "USA/Econ").unwrap().vote_id, "V2");
        assert_eq!(idx.proposal_archived_votes["P1"], set(&["V1"]));
        assert_eq!(idx.proposal_votes.get("P1"), None);
        assert_eq!(idx.vote_count("USA/Econ"), 1);
    }

    #[test]
    fn unresolved_prior_proposal_is_found_in_active_sets() {
        let mut idx = RollupIndexes::default();
        idx.apply(&vote("V1", "0xAA", "P1", 1), &proposal("P1", "T"), None);
        idx.apply(&vote("V2", "0xAA", "P2", 2), &proposal("P2", "T"), None);
        assert_eq!(idx.proposal_archived_votes["P1"], set(&["V1"]));
        assert_eq!(idx.proposal_votes.get("P1"), None);
    }

    #[derive(Debug, Clone)]
    struct Cast {
        voter: usize,
        topic: usize,
        proposal: usize,
        cast_at: u64,
    }

    fn casts() -> impl Strategy<Value = Vec<Cast>> {
        prop::collection::vec(
            (0usize..3, 0usize..2, 0usize..2, 0u64..15).prop_map(
                |(voter, topic, proposal, cast_at)| Cast {
                    voter,
                    topic,
                    proposal,
                    cast_at,
                },
            ),
            0..40,
        )
    }

    fn materialize(casts: &[Cast]) -> Vec<(VoteRecord, ProposalRef)> {
        casts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let topic = format!("T{}", c.topic);
                let proposal_id = format!("{topic}-P{}", c.proposal);
                let mut v = vote(&format!("V{i}"), &format!("0xV{}", c.voter), &proposal_id, c.cast_at);
                v.topic = topic.clone();
                (v, proposal(&proposal_id, &topic))
            })
            .collect()
    }

    fn run(idx: &mut RollupIndexes, votes: &[(VoteRecord, ProposalRef)]) {
        let owners: HashMap<&str, &str> = votes
            .iter()
            .map(|(v, p)| (v.id.as_str(), p.id.as_str()))
            .collect();
        for (v, p) in votes {
            let prior_owner = match idx.disposition(v, &p.topic) {
                Disposition::Replaces(prior) => owners.get(prior.vote_id.as_str()).copied(),
                _ => None,
            };
            idx.apply(v, p, prior_owner);
        }
    }

    proptest! {
        #[test]
        fn replaying_a_stream_is_idempotent(casts in casts()) {
            let votes = materialize(&casts);
            let mut idx = RollupIndexes::default();
            run(&mut idx, &votes);
            let once = idx.clone();
            run(&mut idx, &votes);
            prop_assert_eq!(idx, once);
        }

        #[test]
        fn every_vote_sits_in_exactly_one_set(casts in casts()) {
            let votes = materialize(&casts);
            let mut idx = RollupIndexes::default();
            run(&mut idx, &votes);

            for (v, _) in &votes {
                let active = idx.proposal_votes.values().filter(|s| s.contains(&v.id)).count();
                let archived = idx
                    .proposal_archived_votes
                    .values()
                    .filter(|s| s.contains(&v.id))
                    .count();
                prop_assert_eq!(active + archived, 1, "vote {}", v.id);
            }
            for topics in idx.voter_topic_votes.values() {
                for stamp in topics.values() {
                    prop_assert!(idx.proposal_votes.values().any(|s| s.contains(&stamp.vote_id)));
                }
            }
            let active_total: usize = idx.proposal_votes.values().map(BTreeSet::len).sum();
            let pairs: usize = idx.voter_topic_votes.values().map(BTreeMap::len).sum();
            prop_assert_eq!(active_total, pairs);
        }

        #[test]
        fn topic_counts_never_decrease(casts in casts()) {
            let votes = materialize(&casts);
            let mut idx = RollupIndexes::default();
            let owners: HashMap<String, String> = votes
                .iter()
                .map(|(v, p)| (v.id.clone(), p.id.clone()))
                .collect();
            for (v, p) in &votes {
                let before = idx.topic_vote_counts.clone();
                let prior_owner = match idx.disposition(v, &p.topic) {
                    Disposition::Replaces(prior) => owners.get(&prior.vote_id).cloned(),
                    _ => None,
                };
                idx.apply(v, p, prior_owner.as_deref());
                for (topic, count) in before {
                    prop_assert!(idx.vote_count(&topic) >= count);
                }
            }
            let pairs: u64 = idx.voter_topic_votes.values().map(|t| t.len() as u64).sum();
            prop_assert_eq!(idx.topic_vote_counts.values().sum::<u64>(), pairs);
        }
    }
}
