use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a committed store mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// An optimistic create was confirmed by the data source.
    Created,
    /// An optimistic delete was confirmed by the data source.
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Deleted => "Deleted",
        };
        write!(f, "{s}")
    }
}

/// A committed mutation announced on the cascade bus.
///
/// Only confirmed mutations are published. A rolled-back optimistic change
/// never produces a `StoreChange`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChange {
    /// Time-ordered event identifier (UUID v7).
    pub id: uuid::Uuid,
    /// Name of the store that committed the mutation.
    pub store: String,
    pub kind: ChangeKind,
    /// Persisted id of the affected entity.
    pub entity_id: String,
    pub at: DateTime<Utc>,
}

impl StoreChange {
    pub fn new(store: impl Into<String>, kind: ChangeKind, entity_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            store: store.into(),
            kind,
            entity_id: entity_id.into(),
            at: Utc::now(),
        }
    }
}
