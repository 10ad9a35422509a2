use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{CandidateId, ElectionId, PositionName},
    election::Election,
};

/// A candidate standing for exactly one position in exactly one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique ID.
    pub id: CandidateId,
    /// Owning election.
    pub election_id: ElectionId,
    /// Candidate's full name.
    pub name: String,
    /// Candidate's student matriculation number.
    pub matric_number: String,
    /// Party or affiliation.
    pub party: String,
    /// Manifesto text.
    pub manifesto: String,
    /// The position they are standing for.
    pub position: PositionName,
}

/// A candidate specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub election_id: ElectionId,
    pub name: String,
    pub matric_number: String,
    #[serde(default)]
    pub party: String,
    #[serde(default)]
    pub manifesto: String,
    pub position: PositionName,
}

impl CandidateSpec {
    /// Check this candidate can stand in the given election.
    pub fn validate(&self, election: &Election) -> Result<()> {
        if self.election_id != election.id {
            return Err(Error::BadRequest(format!(
                "Candidate belongs to election {}, not {}",
                self.election_id, election.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::BadRequest("Candidate name must not be empty".to_string()));
        }
        if self.matric_number.trim().is_empty() {
            return Err(Error::BadRequest(
                "Candidate matric number must not be empty".to_string(),
            ));
        }
        if !election.has_position(&self.position) {
            return Err(Error::BadRequest(format!(
                "Position '{}' is not contested in election {}",
                self.position, election.id
            )));
        }
        Ok(())
    }

    /// Convert this spec into a candidate with the given unique ID.
    pub fn into_candidate(self, id: CandidateId) -> Candidate {
        Candidate {
            id,
            election_id: self.election_id,
            name: self.name,
            matric_number: self.matric_number,
            party: self.party,
            manifesto: self.manifesto,
            position: self.position,
        }
    }
}
