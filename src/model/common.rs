use serde::{Deserialize, Serialize};

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are integers; ascending ID order is the tally tie-break.
pub type CandidateId = u32;
/// Our user IDs are integers.
pub type UserId = u32;
/// Audit log entries are numbered in the order they were recorded.
pub type AuditId = u32;
/// Positions are identified by their name, unique within an election.
pub type PositionName = String;

/// The independent ID sequences kept by a store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Election,
    Candidate,
    User,
    AuditEntry,
}

impl IdKind {
    /// Name of the counter backing this sequence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Election => "elections",
            Self::Candidate => "candidates",
            Self::User => "users",
            Self::AuditEntry => "audit_entries",
        }
    }
}
