use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::{AuditId, UserId};

/// Administrative actions recorded automatically by the admin routes.
pub mod actions {
    pub const CREATE_ELECTION: &str = "create_election";
    pub const UPDATE_ELECTION: &str = "update_election";
    pub const CLOSE_ELECTION: &str = "close_election";
    pub const DELETE_ELECTION: &str = "delete_election";
    pub const CREATE_CANDIDATE: &str = "create_candidate";
    pub const UPDATE_CANDIDATE: &str = "update_candidate";
    pub const DELETE_CANDIDATE: &str = "delete_candidate";
    pub const VERIFY_USER: &str = "verify_user";
    pub const DEACTIVATE_USER: &str = "deactivate_user";
}

/// One line of the administrator activity log. Entries are never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    /// The administrator who acted.
    pub actor_id: UserId,
    pub action: String,
    pub details: String,
    pub recorded_at: DateTime<Utc>,
}

/// A free-form log entry, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditNote {
    pub action: String,
    #[serde(default)]
    pub details: String,
}

impl AuditNote {
    pub fn new(action: &str, details: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            details: details.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.action.trim().is_empty() {
            return Err(Error::BadRequest("Log action must not be empty".to_string()));
        }
        Ok(())
    }

    /// Stamp this note into an entry with the given unique ID.
    pub fn into_entry(self, id: AuditId, actor_id: UserId, now: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            actor_id,
            action: self.action.trim().to_string(),
            details: self.details,
            recorded_at: now,
        }
    }
}
