use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{require_non_empty, Entity};
use crate::error::TypeError;

/// Direction of an ownership change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipAction {
    Grant,
    Revoke,
}

impl OwnershipAction {
    /// Signed multiplier applied to the event quantity.
    pub fn sign(self) -> i64 {
        match self {
            Self::Grant => 1,
            Self::Revoke => -1,
        }
    }
}

impl fmt::Display for OwnershipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grant => f.write_str("grant"),
            Self::Revoke => f.write_str("revoke"),
        }
    }
}

impl FromStr for OwnershipAction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grant" => Ok(Self::Grant),
            "revoke" => Ok(Self::Revoke),
            _ => Err(TypeError::UnknownAction(s.to_string())),
        }
    }
}

/// One entry in the ownership ledger.
///
/// `player_id` and `item_id` are loose references: they may hold an
/// internal id, an external identifier, or a display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEvent {
    pub id: String,
    pub player_id: String,
    pub item_id: String,
    pub action: OwnershipAction,
    pub quantity: u32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEventDraft {
    pub player_id: String,
    pub item_id: String,
    pub action: OwnershipAction,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

impl OwnershipEventDraft {
    pub fn grant(player_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            item_id: item_id.into(),
            action: OwnershipAction::Grant,
            quantity: 1,
            note: None,
        }
    }

    pub fn revoke(player_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            action: OwnershipAction::Revoke,
            ..Self::grant(player_id, item_id)
        }
    }
}

impl OwnershipEvent {
    /// Net effect on the owner's quantity.
    pub fn delta(&self) -> i64 {
        self.action.sign() * i64::from(self.quantity)
    }
}

impl Entity for OwnershipEvent {
    type Draft = OwnershipEventDraft;
    const COLLECTION: &'static str = "events";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &OwnershipEventDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            player_id: draft.player_id.clone(),
            item_id: draft.item_id.clone(),
            action: draft.action,
            quantity: draft.quantity,
            note: draft.note.clone(),
            created_at: now,
        }
    }

    fn validate(draft: &OwnershipEventDraft) -> Result<(), TypeError> {
        require_non_empty("player_id", &draft.player_id)?;
        require_non_empty("item_id", &draft.item_id)?;
        if draft.quantity == 0 {
            return Err(TypeError::InvalidQuantity(draft.quantity));
        }
        Ok(())
    }
}

/// Net holdings of one item by one player, derived from the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// `<player_id>:<item_id>`
    pub id: String,
    pub player_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshotDraft {
    pub player_id: String,
    pub item_id: String,
    pub quantity: i64,
}

impl InventorySnapshot {
    pub fn key(player_id: &str, item_id: &str) -> String {
        format!("{player_id}:{item_id}")
    }
}

impl Entity for InventorySnapshot {
    type Draft = InventorySnapshotDraft;
    const COLLECTION: &'static str = "snapshots";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &InventorySnapshotDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            player_id: draft.player_id.clone(),
            item_id: draft.item_id.clone(),
            quantity: draft.quantity,
            updated_at: now,
        }
    }
}
