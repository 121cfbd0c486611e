use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TypeError;

/// A record owned by exactly one entity store.
///
/// Every entity carries a unique string `id`. Stores are generic over this
/// trait and never look at any other field, with the exception of the
/// loose-key resolver (see [`LooseKeyed`]).
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The caller-supplied payload of a create request.
    type Draft: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Plural collection name, used for logging and store naming.
    const COLLECTION: &'static str;

    /// The unique identifier of this entity.
    fn id(&self) -> &str;

    /// Materialize a complete entity from a draft.
    ///
    /// Used both for optimistic placeholders (with a temp id) and by
    /// collaborators assigning a persisted id.
    fn from_draft(id: String, draft: &Self::Draft, now: DateTime<Utc>) -> Self;

    /// Reject drafts that can never be persisted.
    fn validate(_draft: &Self::Draft) -> Result<(), TypeError> {
        Ok(())
    }
}

/// Entities that other records reference through loosely typed foreign keys.
///
/// A reference may hold the internal id, an externally sourced identifier
/// (compared case-insensitively), or a human-readable name.
pub trait LooseKeyed: Entity {
    /// Externally sourced identifier, if any.
    fn external_key(&self) -> Option<&str>;

    /// Display name used as the last-resort match.
    fn display_name(&self) -> Option<&str>;
}

/// Normalize a raw external identifier for comparison.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), TypeError> {
    if value.trim().is_empty() {
        return Err(TypeError::EmptyField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_key("  STEAM_0:1:42 "), "steam_0:1:42");
        assert_eq!(normalize_key("abc"), "abc");
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[ -~]{0,40}") {
            let once = normalize_key(&raw);
            proptest::prop_assert_eq!(normalize_key(&once), once);
        }
    }

    #[test]
    fn empty_field_rejected() {
        assert_eq!(
            require_non_empty("name", "   "),
            Err(TypeError::EmptyField { field: "name" })
        );
        assert!(require_non_empty("name", "Aurora").is_ok());
    }
}
