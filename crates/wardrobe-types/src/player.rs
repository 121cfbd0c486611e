use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{require_non_empty, Entity, LooseKeyed};
use crate::error::TypeError;

/// A registered player account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub username: String,
    /// Account identifier from the game platform, if linked.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for registering a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDraft {
    pub username: String,
    pub external_id: Option<String>,
}

impl PlayerDraft {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            external_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

impl Entity for Player {
    type Draft = PlayerDraft;
    const COLLECTION: &'static str = "players";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &PlayerDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: draft.username.clone(),
            external_id: draft.external_id.clone(),
            created_at: now,
        }
    }

    fn validate(draft: &PlayerDraft) -> Result<(), TypeError> {
        require_non_empty("username", &draft.username)
    }
}

impl LooseKeyed for Player {
    fn external_key(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn display_name(&self) -> Option<&str> {
        Some(&self.username)
    }
}
