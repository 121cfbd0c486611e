//! Domain records for the Wardrobe admin console.
//!
//! Every entity store in `wardrobe-store` is generic over the [`Entity`]
//! trait defined here. Records are plain serde structs; the stores own all
//! caching and consistency concerns.
//!
//! # Key Types
//!
//! - [`Player`] -- registered account, resolvable by id, platform id, or username
//! - [`Cosmetic`] -- catalog definition with slot and rarity
//! - [`Item`] -- grantable item, resolvable by id, SKU, or name
//! - [`OwnershipEvent`] -- mutable ledger entry (grant/revoke)
//! - [`InventorySnapshot`] -- aggregate derived from the ledger

pub mod catalog;
pub mod entity;
pub mod error;
pub mod ownership;
pub mod player;
pub mod temp_id;

pub use catalog::{Cosmetic, CosmeticDraft, CosmeticSlot, Item, ItemDraft, Rarity};
pub use entity::{normalize_key, Entity, LooseKeyed};
pub use error::TypeError;
pub use ownership::{
    InventorySnapshot, InventorySnapshotDraft, OwnershipAction, OwnershipEvent,
    OwnershipEventDraft,
};
pub use player::{Player, PlayerDraft};
pub use temp_id::{is_temp_id, temp_id, TEMP_ID_PREFIX};
