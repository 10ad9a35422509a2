use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    candidate::Candidate,
    common::{CandidateId, ElectionId, PositionName, UserId},
    election::{Election, ElectionStatus},
};

/// Position name to chosen candidate. Omitted positions are abstentions.
pub type Selections = BTreeMap<PositionName, CandidateId>;

/// One voter's immutable ballot for one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: UserId,
    pub election_id: ElectionId,
    pub selections: Selections,
    pub cast_at: DateTime<Utc>,
}

/// Reasons a ballot is rejected. Each is reported to the voter as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    #[error("Voter has already cast a ballot in this election")]
    AlreadyVoted,
    #[error("Election is {0}, not active")]
    ElectionNotActive(ElectionStatus),
    #[error("Ballot does not select a candidate for any position")]
    NoSelections,
    #[error("Position '{0}' is not contested in this election")]
    UnknownPosition(PositionName),
    #[error("Candidate {candidate} is not standing for '{position}' in this election")]
    InvalidCandidate {
        position: PositionName,
        candidate: CandidateId,
    },
}

impl BallotError {
    /// Stable machine-readable name of this rejection.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyVoted => "AlreadyVoted",
            Self::ElectionNotActive(_) => "ElectionNotActive",
            Self::NoSelections => "NoSelections",
            Self::UnknownPosition(_) => "UnknownPosition",
            Self::InvalidCandidate { .. } => "InvalidCandidate",
        }
    }
}

/// Validate a proposed ballot against the election's current state.
///
/// `already_voted` reports whether a ballot exists for this (voter, election)
/// pair. `candidates` must be the election's full candidate slate. On success
/// the returned ballot is ready to be stored.
pub fn validate(
    election: &Election,
    candidates: &[Candidate],
    already_voted: bool,
    voter_id: UserId,
    selections: Selections,
    now: DateTime<Utc>,
) -> Result<Ballot, BallotError> {
    if already_voted {
        return Err(BallotError::AlreadyVoted);
    }
    let status = election.status_at(now);
    if status != ElectionStatus::Active {
        return Err(BallotError::ElectionNotActive(status));
    }
    if selections.is_empty() {
        return Err(BallotError::NoSelections);
    }
    for (position, &candidate_id) in &selections {
        if !election.has_position(position) {
            return Err(BallotError::UnknownPosition(position.clone()));
        }
        let standing = candidates.iter().any(|c| {
            c.id == candidate_id && c.election_id == election.id && &c.position == position
        });
        if !standing {
            return Err(BallotError::InvalidCandidate {
                position: position.clone(),
                candidate: candidate_id,
            });
        }
    }
    Ok(Ballot {
        voter_id,
        election_id: election.id,
        selections,
        cast_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::model::{candidate::CandidateSpec, election::ElectionSpec};

    fn setup() -> (Election, Vec<Candidate>) {
        let election = ElectionSpec::current_example().into_election(1);
        let candidates = vec![
            CandidateSpec::example(1, "A", "President").into_candidate(10),
            CandidateSpec::example(1, "B", "President").into_candidate(11),
            CandidateSpec::example(1, "C", "Vice President").into_candidate(12),
        ];
        (election, candidates)
    }

    fn selections(pairs: &[(&str, CandidateId)]) -> Selections {
        pairs.iter().map(|(p, c)| (p.to_string(), *c)).collect()
    }

    #[test]
    fn accepts_partial_ballot() {
        let (election, candidates) = setup();
        let now = Utc::now();
        let ballot = validate(
            &election,
            &candidates,
            false,
            42,
            selections(&[("President", 10)]),
            now,
        )
        .unwrap();
        assert_eq!(ballot.voter_id, 42);
        assert_eq!(ballot.election_id, 1);
        assert_eq!(ballot.selections.len(), 1);
        assert_eq!(ballot.cast_at, now);
    }

    #[test]
    fn rejects_second_ballot() {
        let (election, candidates) = setup();
        let result = validate(
            &election,
            &candidates,
            true,
            42,
            selections(&[("President", 10)]),
            Utc::now(),
        );
        assert_eq!(result, Err(BallotError::AlreadyVoted));
    }

    #[test]
    fn rejects_empty_ballot() {
        let (election, candidates) = setup();
        let result = validate(&election, &candidates, false, 42, Selections::new(), Utc::now());
        assert_eq!(result, Err(BallotError::NoSelections));
    }

    #[test]
    fn rejects_inactive_election() {
        let (election, candidates) = setup();
        let before = election.start_time - Duration::minutes(1);
        let after = election.end_time + Duration::minutes(1);
        let ballot = selections(&[("President", 10)]);

        assert_eq!(
            validate(&election, &candidates, false, 42, ballot.clone(), before),
            Err(BallotError::ElectionNotActive(ElectionStatus::Upcoming))
        );
        assert_eq!(
            validate(&election, &candidates, false, 42, ballot, after),
            Err(BallotError::ElectionNotActive(ElectionStatus::Closed))
        );
    }

    #[test]
    fn rejects_unknown_position() {
        let (election, candidates) = setup();
        let result = validate(
            &election,
            &candidates,
            false,
            42,
            selections(&[("President", 10), ("Treasurer", 10)]),
            Utc::now(),
        );
        assert_eq!(
            result,
            Err(BallotError::UnknownPosition("Treasurer".to_string()))
        );
    }

    #[test]
    fn rejects_candidate_standing_elsewhere() {
        let (election, candidates) = setup();
        // Candidate 12 exists in this election, but for another position.
        let result = validate(
            &election,
            &candidates,
            false,
            42,
            selections(&[("President", 12)]),
            Utc::now(),
        );
        assert_eq!(
            result,
            Err(BallotError::InvalidCandidate {
                position: "President".to_string(),
                candidate: 12,
            })
        );

        let result = validate(
            &election,
            &candidates,
            false,
            42,
            selections(&[("President", 99)]),
            Utc::now(),
        );
        assert_eq!(result.unwrap_err().kind(), "InvalidCandidate");
    }

    #[test]
    fn already_voted_takes_precedence() {
        let (election, candidates) = setup();
        let after = election.end_time + Duration::minutes(1);
        let result = validate(&election, &candidates, true, 42, Selections::new(), after);
        assert_eq!(result, Err(BallotError::AlreadyVoted));
    }
}
