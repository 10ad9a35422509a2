use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::{ElectionId, PositionName};

/// Effective election status, derived from the clock and any forced closure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Voting has not opened yet; candidates may still be edited.
    Upcoming,
    /// Ballots are accepted.
    Active,
    /// Ballots are no longer accepted; the election is archived.
    Closed,
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Upcoming => "upcoming",
                Self::Active => "active",
                Self::Closed => "closed",
            }
        )
    }
}

/// An election, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    pub id: ElectionId,
    /// Election name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Voting opens at this time.
    pub start_time: DateTime<Utc>,
    /// Voting closes after this time.
    pub end_time: DateTime<Utc>,
    /// Set when an admin closes the election early.
    pub closed_at: Option<DateTime<Utc>>,
    /// Contested positions, in ballot order.
    pub positions: Vec<PositionName>,
}

impl Election {
    /// The status of this election at the given instant.
    ///
    /// A forced closure always wins. Otherwise the status follows the clock:
    /// there is no way to open an election before its start time or to keep it
    /// open after its end time.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if self.closed_at.is_some() || now > self.end_time {
            ElectionStatus::Closed
        } else if now < self.start_time {
            ElectionStatus::Upcoming
        } else {
            ElectionStatus::Active
        }
    }

    /// Is `position` contested in this election?
    pub fn has_position(&self, position: &str) -> bool {
        self.positions.iter().any(|p| p == position)
    }

    /// Close the election early.
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status_at(now) == ElectionStatus::Closed {
            return Err(Error::BadRequest(format!(
                "Election {} is already closed",
                self.id
            )));
        }
        self.closed_at = Some(now);
        Ok(())
    }

    /// Fail unless the election is still upcoming, i.e. its candidate slate
    /// and settings may still change.
    pub fn ensure_editable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status_at(now) {
            ElectionStatus::Upcoming => Ok(()),
            status => Err(Error::BadRequest(format!(
                "Election {} is {status} and can no longer be modified",
                self.id
            ))),
        }
    }
}

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Election start time.
    pub start_time: DateTime<Utc>,
    /// Election end time.
    pub end_time: DateTime<Utc>,
    /// Contested positions, in ballot order.
    pub positions: Vec<PositionName>,
}

impl ElectionSpec {
    /// Check the spec describes a well-formed election.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::BadRequest("Election name must not be empty".to_string()));
        }
        if self.end_time <= self.start_time {
            return Err(Error::BadRequest(
                "Election must end after it starts".to_string(),
            ));
        }
        if self.positions.is_empty() {
            return Err(Error::BadRequest(
                "Election must contest at least one position".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for position in &self.positions {
            if position.trim().is_empty() {
                return Err(Error::BadRequest("Position names must not be empty".to_string()));
            }
            if !seen.insert(position.as_str()) {
                return Err(Error::BadRequest(format!("Duplicate position '{position}'")));
            }
        }
        Ok(())
    }

    /// Fail unless voting would open after `now`. Setting a start time in the
    /// past would open the election early.
    pub fn ensure_starts_after(&self, now: DateTime<Utc>) -> Result<()> {
        if self.start_time <= now {
            return Err(Error::BadRequest(
                "Election must start in the future".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert this spec into an election with the given unique ID.
    pub fn into_election(self, id: ElectionId) -> Election {
        Election {
            id,
            name: self.name,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            closed_at: None,
            positions: self.positions,
        }
    }

    /// Apply this spec to an existing election, keeping its ID and closure state.
    pub fn apply_to(self, election: &mut Election) {
        election.name = self.name;
        election.description = self.description;
        election.start_time = self.start_time;
        election.end_time = self.end_time;
        election.positions = self.positions;
    }
}
