use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{require_non_empty, Entity, LooseKeyed};
use crate::error::TypeError;

/// Where a cosmetic is worn or shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmeticSlot {
    Head,
    Body,
    Back,
    Emote,
    Trail,
}

impl fmt::Display for CosmeticSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Head => "head",
            Self::Body => "body",
            Self::Back => "back",
            Self::Emote => "emote",
            Self::Trail => "trail",
        };
        f.write_str(s)
    }
}

impl FromStr for CosmeticSlot {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "head" => Ok(Self::Head),
            "body" => Ok(Self::Body),
            "back" => Ok(Self::Back),
            "emote" => Ok(Self::Emote),
            "trail" => Ok(Self::Trail),
            _ => Err(TypeError::UnknownSlot(s.to_string())),
        }
    }
}

/// Drop rarity tier, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        };
        f.write_str(s)
    }
}

impl FromStr for Rarity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "common" => Ok(Self::Common),
            "rare" => Ok(Self::Rare),
            "epic" => Ok(Self::Epic),
            "legendary" => Ok(Self::Legendary),
            _ => Err(TypeError::UnknownRarity(s.to_string())),
        }
    }
}

/// A cosmetic definition in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosmetic {
    pub id: String,
    pub name: String,
    pub slot: CosmeticSlot,
    pub rarity: Rarity,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticDraft {
    pub name: String,
    pub slot: CosmeticSlot,
    pub rarity: Rarity,
}

impl Entity for Cosmetic {
    type Draft = CosmeticDraft;
    const COLLECTION: &'static str = "cosmetics";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &CosmeticDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name.clone(),
            slot: draft.slot,
            rarity: draft.rarity,
            created_at: now,
        }
    }

    fn validate(draft: &CosmeticDraft) -> Result<(), TypeError> {
        require_non_empty("name", &draft.name)
    }
}

/// A grantable item, optionally bound to a cosmetic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub cosmetic_id: Option<String>,
    /// Store SKU from the external storefront.
    pub sku: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default)]
    pub cosmetic_id: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl ItemDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Entity for Item {
    type Draft = ItemDraft;
    const COLLECTION: &'static str = "items";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &ItemDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name.clone(),
            cosmetic_id: draft.cosmetic_id.clone(),
            sku: draft.sku.clone(),
            created_at: now,
        }
    }

    fn validate(draft: &ItemDraft) -> Result<(), TypeError> {
        require_non_empty("name", &draft.name)
    }
}

impl LooseKeyed for Item {
    fn external_key(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    fn display_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_parse_is_case_insensitive() {
        assert_eq!("HEAD".parse::<CosmeticSlot>().unwrap(), CosmeticSlot::Head);
        assert_eq!(
            "wings".parse::<CosmeticSlot>(),
            Err(TypeError::UnknownSlot("wings".into()))
        );
    }

    #[test]
    fn rarity_orders_by_tier() {
        assert!(Rarity::Common < Rarity::Legendary);
        assert_eq!(Rarity::Epic.to_string(), "epic");
    }

    #[test]
    fn item_draft_defaults_optional_fields() {
        let draft: ItemDraft = serde_json::from_str(r#"{"name":"Aurora"}"#).unwrap();
        assert_eq!(draft, ItemDraft::named("Aurora"));
    }

    #[test]
    fn item_exposes_sku_as_external_key() {
        let draft = ItemDraft {
            sku: Some("SKU-77".into()),
            ..ItemDraft::named("Ember Cape")
        };
        let item = Item::from_draft("i-1".into(), &draft, Utc::now());
        assert_eq!(item.external_key(), Some("SKU-77"));
        assert_eq!(item.display_name(), Some("Ember Cape"));
    }
}
