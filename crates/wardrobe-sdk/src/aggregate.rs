//! Inventory aggregate derived from the ownership ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wardrobe_store::{EntitySource, Filter, SourceError, SourceResult};
use wardrobe_types::{InventorySnapshot, InventorySnapshotDraft, OwnershipEvent};

/// Net holdings per (player, item): grants minus revokes.
///
/// Pairs that net to zero or below are left out. `updated_at` is the time
/// of the latest event for the pair. Output is ordered by player, then
/// item.
pub fn project_inventory(events: &[OwnershipEvent]) -> Vec<InventorySnapshot> {
    let mut totals: BTreeMap<(&str, &str), (i64, DateTime<Utc>)> = BTreeMap::new();
    for event in events {
        let entry = totals
            .entry((event.player_id.as_str(), event.item_id.as_str()))
            .or_insert((0, event.created_at));
        entry.0 += event.delta();
        entry.1 = entry.1.max(event.created_at);
    }
    totals
        .into_iter()
        .filter(|(_, (quantity, _))| *quantity > 0)
        .map(|((player_id, item_id), (quantity, updated_at))| InventorySnapshot {
            id: InventorySnapshot::key(player_id, item_id),
            player_id: player_id.to_string(),
            item_id: item_id.to_string(),
            quantity,
            updated_at,
        })
        .collect()
}

/// Read-only source for inventory snapshots, computed on every fetch from
/// the ledger's source.
pub struct LedgerAggregateSource {
    ledger: Arc<dyn EntitySource<OwnershipEvent>>,
}

impl LedgerAggregateSource {
    pub fn new(ledger: Arc<dyn EntitySource<OwnershipEvent>>) -> Self {
        Self { ledger }
    }

    async fn project(&self) -> SourceResult<Vec<InventorySnapshot>> {
        let events = self.ledger.fetch_all(None).await?;
        Ok(project_inventory(&events))
    }
}

fn read_only() -> SourceError {
    SourceError::Validation("inventory snapshots are derived from the ownership ledger".into())
}

#[async_trait]
impl EntitySource<InventorySnapshot> for LedgerAggregateSource {
    async fn fetch_all(&self, filter: Option<&Filter>) -> SourceResult<Vec<InventorySnapshot>> {
        let mut snapshots = self.project().await?;
        if let Some(filter) = filter {
            snapshots.retain(|s| filter.matches(s));
        }
        Ok(snapshots)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> SourceResult<Vec<InventorySnapshot>> {
        let mut snapshots = self.project().await?;
        snapshots.retain(|s| ids.contains(&s.id));
        Ok(snapshots)
    }

    async fn create(&self, _draft: InventorySnapshotDraft) -> SourceResult<InventorySnapshot> {
        Err(read_only())
    }

    async fn delete(&self, _id: &str) -> SourceResult<()> {
        Err(read_only())
    }

    async fn count(&self) -> SourceResult<Option<u64>> {
        Ok(Some(self.project().await?.len() as u64))
    }
}
