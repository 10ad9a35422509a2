//! Shapes exchanged with the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::Selections,
    candidate::Candidate,
    common::{ElectionId, PositionName},
    election::{Election, ElectionStatus},
    tally::PositionTally,
};

/// An election together with its effective status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionView {
    #[serde(flatten)]
    pub election: Election,
    pub status: ElectionStatus,
}

impl ElectionView {
    pub fn at(election: Election, now: DateTime<Utc>) -> Self {
        let status = election.status_at(now);
        Self { election, status }
    }
}

/// The candidates standing for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSlate {
    pub position: PositionName,
    pub candidates: Vec<Candidate>,
}

impl PositionSlate {
    /// Group an election's candidates by position, in ballot order.
    pub fn group(election: &Election, candidates: &[Candidate]) -> Vec<Self> {
        election
            .positions
            .iter()
            .map(|position| Self {
                position: position.clone(),
                candidates: candidates
                    .iter()
                    .filter(|c| &c.position == position)
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

/// A ballot as submitted by a student: position to chosen candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotePayload {
    pub votes: Selections,
}

/// Whether the caller has voted in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotedStatus {
    pub election_id: ElectionId,
    pub has_voted: bool,
    pub cast_at: Option<DateTime<Utc>>,
}

/// Full results of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election: ElectionView,
    pub ballots_cast: u64,
    /// Verified, active students.
    pub eligible_voters: u64,
    /// Share of `eligible_voters` who have cast a ballot. Ballots from voters
    /// who have since become ineligible count in the tally but not here.
    pub turnout: f64,
    pub positions: Vec<PositionTally>,
}

/// System-wide figures for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_elections: u64,
    pub active_elections: u64,
    /// Registered student accounts.
    pub total_voters: u64,
    /// Ballots cast across all elections.
    pub total_votes: u64,
}
