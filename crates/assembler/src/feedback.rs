use govsync_protocol::{normalize_address, Complaint, FeedbackRecord};
use serde::{Deserialize, Serialize};

/// Ratings and complaints for one proposal, reduced to what a view shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    /// Mean rating, 0 when nobody rated.
    pub average_rating: f64,
    pub rating_count: usize,
    pub complaint_count: usize,
    pub complaints: Vec<Complaint>,
}

impl FeedbackSummary {
    #[must_use]
    pub fn from_record(record: &FeedbackRecord) -> Self {
        let rating_count = record.ratings.len();
        let average_rating = if rating_count == 0 {
            0.0
        } else {
            let total: f64 = record.ratings.iter().map(|r| f64::from(r.rating)).sum();
            total / rating_count as f64
        };
        let mut complaints = record.complaints.clone();
        complaints.sort_by_key(|c| c.created_at);
        Self {
            average_rating,
            rating_count,
            complaint_count: complaints.len(),
            complaints,
        }
    }
}

/// One citizen's rating and complaints on one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenFeedback {
    pub proposal_id: String,
    pub citizen: String,
    /// `None` when the citizen has not rated the proposal.
    #[serde(default)]
    pub rating: Option<u32>,
    /// Oldest first.
    pub complaints: Vec<Complaint>,
}

impl CitizenFeedback {
    /// Addresses are compared case-insensitively. A citizen who rated twice keeps the last rating.
    #[must_use]
    pub fn from_record(proposal_id: &str, citizen: &str, record: &FeedbackRecord) -> Self {
        let citizen = normalize_address(citizen);
        let rating = record
            .ratings
            .iter()
            .rev()
            .find(|r| normalize_address(&r.rater) == citizen)
            .map(|r| r.rating);
        let mut complaints: Vec<Complaint> = record
            .complaints
            .iter()
            .filter(|c| normalize_address(&c.complainer) == citizen)
            .cloned()
            .collect();
        complaints.sort_by_key(|c| c.created_at);
        Self {
            proposal_id: proposal_id.to_string(),
            citizen,
            rating,
            complaints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govsync_protocol::Rating;

    #[test]
    fn mean_of_ratings_and_sorted_complaints() {
        let record = FeedbackRecord {
            ratings: vec![
                Rating {
                    rater: "a".into(),
                    rating: 4,
                },
                Rating {
                    rater: "b".into(),
                    rating: 5,
                },
            ],
            complaints: vec![
                Complaint {
                    complainer: "c".into(),
                    description: "late".into(),
                    created_at: 20,
                },
                Complaint {
                    complainer: "d".into(),
                    description: "wrong".into(),
                    created_at: 10,
                },
            ],
        };
        let summary = FeedbackSummary::from_record(&record);
        assert_eq!(summary.average_rating, 4.5);
        assert_eq!(summary.rating_count, 2);
        assert_eq!(summary.complaint_count, 2);
        assert_eq!(summary.complaints[0].description, "wrong");
    }

    #[test]
    fn no_ratings_means_zero() {
        let summary = FeedbackSummary::from_record(&FeedbackRecord::default());
        assert_eq!(summary, FeedbackSummary::default());
    }

    #[test]
    fn citizen_feedback_keeps_only_that_citizen() {
        let record = FeedbackRecord {
            ratings: vec![
                Rating {
                    rater: "0xAA".into(),
                    rating: 2,
                },
                Rating {
                    rater: "0xbb".into(),
                    rating: 5,
                },
            ],
            complaints: vec![
                Complaint {
                    complainer: "0xaa".into(),
                    description: "second".into(),
                    created_at: 30,
                },
                Complaint {
                    complainer: "0xbb".into(),
                    description: "other".into(),
                    created_at: 5,
                },
                Complaint {
                    complainer: "0xAA".into(),
                    description: "first".into(),
                    created_at: 10,
                },
            ],
        };
        let mine = CitizenFeedback::from_record("ZTMProposal:v1:1", "0xaA", &record);
        assert_eq!(mine.citizen, "0xaa");
        assert_eq!(mine.rating, Some(2));
        let descriptions: Vec<&str> = mine.complaints.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(descriptions, vec!["first", "second"]);

        let stranger = CitizenFeedback::from_record("ZTMProposal:v1:1", "0xcc", &record);
        assert_eq!(stranger.rating, None);
        assert!(stranger.complaints.is_empty());
    }
}
