//! Optimistic create and delete.
//!
//! Each mutation stages its local change in one state update, awaits the
//! data source, then either commits or undoes exactly that change. A
//! pending mutation is tracked by id in the snapshot's optimistic set, and
//! a second mutation of the same id is refused until the first settles.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use wardrobe_fabric::ChangeKind;
use wardrobe_types::{temp_id, Entity};

use crate::error::{StoreError, StoreResult};
use crate::guard::Rollback;
use crate::store::EntityStore;

impl<E: Entity> EntityStore<E> {
    /// Show `draft` immediately under a temp id, persist it, then swap the
    /// placeholder for the persisted entity.
    ///
    /// On failure the placeholder is removed and the source error is
    /// returned unchanged.
    pub async fn create_optimistic(&self, draft: E::Draft) -> StoreResult<Arc<E>> {
        let temp = temp_id();
        let placeholder = Arc::new(E::from_draft(temp.clone(), &draft, Utc::now()));

        let mut claimed = false;
        self.sender().send_if_modified(|snap| {
            if snap.optimistic.contains(&temp) {
                return false;
            }
            snap.collection.upsert(Arc::clone(&placeholder));
            snap.optimistic.insert(temp.clone());
            claimed = true;
            true
        });
        if !claimed {
            return Err(StoreError::MutationPending(temp));
        }
        debug!(store = %self.name(), temp_id = %temp, "optimistic create staged");

        let rollback = Rollback::new(|| self.discard_placeholder(&temp));
        match self.source().create(draft).await {
            Ok(persisted) => {
                rollback.disarm();
                let persisted = Arc::new(persisted);
                self.sender().send_modify(|snap| {
                    snap.optimistic.remove(&temp);
                    match snap.collection.remove(&temp) {
                        Some((position, _)) => {
                            snap.collection.insert_at(position, Arc::clone(&persisted))
                        }
                        None => {
                            snap.collection.upsert(Arc::clone(&persisted));
                        }
                    }
                });
                info!(store = %self.name(), temp_id = %temp, id = persisted.id(), "create committed");
                self.publish(ChangeKind::Created, persisted.id());
                Ok(persisted)
            }
            Err(err) => {
                drop(rollback);
                warn!(store = %self.name(), temp_id = %temp, error = %err, "create failed; placeholder rolled back");
                Err(err.into())
            }
        }
    }

    /// Hide the entity immediately, delete it at the source, and put the
    /// same entity back at its old position if the source refuses.
    ///
    /// Deleting an id that is not cached is a no-op and makes no network
    /// call.
    pub async fn delete_optimistic(&self, id: &str) -> StoreResult<()> {
        let mut staged = Ok(None);
        self.sender().send_if_modified(|snap| {
            if snap.optimistic.contains(id) {
                staged = Err(StoreError::MutationPending(id.to_string()));
                return false;
            }
            let Some(removed) = snap.collection.remove(id) else {
                return false;
            };
            snap.optimistic.insert(id.to_string());
            staged = Ok(Some(removed));
            true
        });
        let Some((position, entity)) = staged? else {
            debug!(store = %self.name(), id, "delete of uncached id ignored");
            return Ok(());
        };

        let rollback = Rollback::new(|| self.restore_removed(position, &entity));
        match self.source().delete(id).await {
            Ok(()) => {
                rollback.disarm();
                self.sender().send_modify(|snap| {
                    snap.optimistic.remove(id);
                });
                info!(store = %self.name(), id, "delete committed");
                self.publish(ChangeKind::Deleted, id);
                Ok(())
            }
            Err(err) => {
                drop(rollback);
                warn!(store = %self.name(), id, error = %err, "delete failed; entity restored");
                Err(err.into())
            }
        }
    }

    fn discard_placeholder(&self, temp: &str) {
        self.sender().send_modify(|snap| {
            snap.collection.remove(temp);
            snap.optimistic.remove(temp);
        });
    }

    fn restore_removed(&self, position: usize, entity: &Arc<E>) {
        self.sender().send_modify(|snap| {
            if !snap.collection.contains(entity.id()) {
                snap.collection.insert_at(position, Arc::clone(entity));
            }
            snap.optimistic.remove(entity.id());
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use wardrobe_fabric::{CascadeBus, ChangeFilter};
    use wardrobe_types::{is_temp_id, Item, ItemDraft};

    use super::*;
    use crate::config::StoreConfig;
    use crate::error::{ErrorKind, SourceError};
    use crate::memory::{InMemorySource, SourceOp};
    use crate::store::FetchOptions;

    fn item(id: &str, name: &str) -> Item {
        Item::from_draft(id.into(), &ItemDraft::named(name), Utc::now())
    }

    async fn loaded(source: &Arc<InMemorySource<Item>>) -> EntityStore<Item> {
        let store = EntityStore::new(source.clone(), StoreConfig::default());
        store.fetch(FetchOptions::default()).await.unwrap();
        store
    }

    fn seeded() -> Arc<InMemorySource<Item>> {
        Arc::new(InMemorySource::with_records(
            "item",
            vec![item("item-1", "Ember"), item("item-2", "Frost"), item("item-3", "Gale")],
        ))
    }

    #[tokio::test]
    async fn create_swaps_placeholder_for_persisted() {
        let source = Arc::new(InMemorySource::<Item>::new("real").with_next_id(42));
        let store = EntityStore::new(source.clone(), StoreConfig::default());
        let mut rx = store.subscribe();

        let created = store
            .create_optimistic(ItemDraft::named("Aurora"))
            .await
            .unwrap();
        assert_eq!(created.id, "real-42");
        assert_eq!(created.name, "Aurora");

        // Subscribers saw the placeholder and the commit.
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert!(snap.optimistic.is_empty());
        assert!(Arc::ptr_eq(store.get_by_id("real-42").as_ref().unwrap(), &created));
        assert_eq!(store.len(), 1);
        assert!(store.entities().iter().all(|i| !is_temp_id(&i.id)));
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_visible_while_pending() {
        let source = Arc::new(
            InMemorySource::<Item>::new("real")
                .with_next_id(42)
                .with_latency(Duration::from_millis(50)),
        );
        let store = EntityStore::new(source, StoreConfig::default());

        let (created, pending) = tokio::join!(store.create_optimistic(ItemDraft::named("Aurora")), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.snapshot()
        });

        assert_eq!(pending.collection.len(), 1);
        let temp = &pending.collection.entities()[0];
        assert!(is_temp_id(&temp.id));
        assert_eq!(temp.name, "Aurora");
        assert!(pending.optimistic.contains(&temp.id));

        let created = created.unwrap();
        assert!(store.get_by_id(&temp.id).is_none());
        assert_eq!(store.get_by_id("real-42").unwrap().id, created.id);
        assert!(store.optimistic_ids().is_empty());
    }

    #[tokio::test]
    async fn failed_create_restores_prior_state() {
        let source = seeded();
        let store = loaded(&source).await;
        let before = store.snapshot();

        source.fail_next(SourceOp::Create, SourceError::Conflict("conflict".into()));
        let err = store
            .create_optimistic(ItemDraft::named("Aurora"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "conflict");
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
        let after = store.snapshot();
        assert_eq!(after.collection.len(), before.collection.len());
        assert!(after.optimistic.is_empty());
        assert!(after.collection.is_consistent());
        assert!(after
            .collection
            .iter()
            .zip(before.collection.iter())
            .all(|(a, b)| Arc::ptr_eq(a, b)));
    }

    #[tokio::test]
    async fn create_after_refresh_is_not_duplicated() {
        let source = Arc::new(InMemorySource::<Item>::new("real").with_next_id(7));
        let store = EntityStore::new(source.clone(), StoreConfig::default());
        // The persisted row already arrived through some other path.
        store.add_entity(item("real-7", "Aurora"));

        store
            .create_optimistic(ItemDraft::named("Aurora"))
            .await
            .unwrap();
        let ids: Vec<String> = store.entities().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["real-7".to_string()]);
    }

    #[tokio::test]
    async fn delete_commits_and_clears_pending() {
        let source = seeded();
        let store = loaded(&source).await;

        store.delete_optimistic("item-2").await.unwrap();
        assert!(store.get_by_id("item-2").is_none());
        assert!(store.optimistic_ids().is_empty());
        assert_eq!(source.len(), 2);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_a_no_op() {
        let source = seeded();
        let store = loaded(&source).await;
        let mut rx = store.subscribe();

        store.delete_optimistic("ghost").await.unwrap();
        assert_eq!(source.calls(SourceOp::Delete), 0);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_delete_restores_same_entity_in_place() {
        let source = seeded();
        let store = loaded(&source).await;
        let original = store.get_by_id("item-2").unwrap();

        source.fail_next(SourceOp::Delete, SourceError::Network("offline".into()));
        let err = store.delete_optimistic("item-2").await.unwrap_err();
        assert_eq!(err.to_string(), "offline");

        let restored = store.get_by_id("item-2").unwrap();
        assert!(Arc::ptr_eq(&restored, &original));
        let ids: Vec<String> = store.entities().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["item-1", "item-2", "item-3"]);
        assert!(store.optimistic_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_delete_of_pending_id_is_refused() {
        let source = Arc::new(
            InMemorySource::with_records("item", vec![item("item-1", "Ember")])
                .with_latency(Duration::from_millis(50)),
        );
        let store = loaded(&source).await;

        let (first, second) = tokio::join!(store.delete_optimistic("item-1"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.delete_optimistic("item-1").await
        });
        first.unwrap();
        assert_eq!(
            second.unwrap_err(),
            StoreError::MutationPending("item-1".into())
        );
        assert_eq!(source.calls(SourceOp::Delete), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_pending_delete_hidden() {
        let source = Arc::new(
            InMemorySource::with_records("item", vec![item("item-1", "Ember"), item("item-2", "Frost")])
                .with_latency(Duration::from_millis(50)),
        );
        let store = loaded(&source).await;

        // The refresh reads the source before the delete lands there.
        let (refreshed, deleted) = tokio::join!(
            async {
                let outcome = store.refresh().await;
                (outcome, store.get_by_id("item-1"), store.is_pending("item-1"))
            },
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                store.delete_optimistic("item-1").await
            }
        );
        let (outcome, seen, pending) = refreshed;
        assert!(outcome.unwrap().is_fetched());
        assert!(pending);
        assert!(seen.is_none());

        deleted.unwrap();
        assert!(store.get_by_id("item-1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_entities_keeps_pending_delete_hidden() {
        let source = Arc::new(
            InMemorySource::with_records("item", vec![item("item-1", "Ember"), item("item-2", "Frost")])
                .with_latency(Duration::from_millis(50)),
        );
        let store = loaded(&source).await;

        let (deleted, seen) = tokio::join!(store.delete_optimistic("item-1"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            // The source still holds item-1 at this point.
            store.set_entities(source.records());
            (store.get_by_id("item-1"), store.is_pending("item-1"), store.len())
        });
        let (seen, pending, len) = seen;
        assert!(seen.is_none());
        assert!(pending);
        assert_eq!(len, 1);

        deleted.unwrap();
        assert!(store.get_by_id("item-1").is_none());
        assert!(source.records().iter().all(|i| i.id != "item-1"));
        assert!(store.snapshot().collection.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn set_entities_keeps_pending_placeholder() {
        let source = Arc::new(
            InMemorySource::with_records("item", vec![item("item-1", "Ember")])
                .with_latency(Duration::from_millis(50)),
        );
        let store = loaded(&source).await;

        let (created, during) = tokio::join!(store.create_optimistic(ItemDraft::named("Aurora")), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.set_entities(vec![item("item-1", "Ember")]);
            store.snapshot()
        });
        assert_eq!(during.collection.len(), 2);
        for id in &during.optimistic {
            assert!(during.collection.contains(id));
        }

        let created = created.unwrap();
        assert!(store.get_by_id(&created.id).is_some());
        assert_eq!(store.len(), 2);
        assert!(store.optimistic_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_pending_placeholder() {
        let source = Arc::new(
            InMemorySource::with_records("item", vec![item("item-1", "Ember")])
                .with_latency(Duration::from_millis(50)),
        );
        let store = loaded(&source).await;

        let (refreshed, created) = tokio::join!(
            async {
                let outcome = store.refresh().await;
                (outcome, store.len())
            },
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                store.create_optimistic(ItemDraft::named("Aurora")).await
            }
        );
        let (outcome, len_after_refresh) = refreshed;
        assert!(outcome.unwrap().is_fetched());
        // item-1 plus the still-pending placeholder.
        assert_eq!(len_after_refresh, 2);

        let created = created.unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get_by_id(&created.id).is_some());
        assert!(store.optimistic_ids().is_empty());
    }

    #[tokio::test]
    async fn dropped_create_rolls_back() {
        let source = Arc::new(
            InMemorySource::<Item>::new("real").with_latency(Duration::from_secs(60)),
        );
        let store = EntityStore::new(source, StoreConfig::default());
        let pending = store.create_optimistic(ItemDraft::named("Aurora"));
        let timed_out = tokio::time::timeout(Duration::from_millis(1), pending).await;
        assert!(timed_out.is_err());
        assert!(store.is_empty());
        assert!(store.optimistic_ids().is_empty());
    }

    #[tokio::test]
    async fn committed_mutations_are_published() {
        let bus = Arc::new(CascadeBus::default());
        let mut changes = bus.subscribe(ChangeFilter::from_store("items"));
        let source = seeded();
        let store = EntityStore::new(source.clone(), StoreConfig::default()).with_bus(bus);
        store.fetch(FetchOptions::default()).await.unwrap();

        source.fail_next(SourceOp::Create, SourceError::Conflict("conflict".into()));
        store
            .create_optimistic(ItemDraft::named("Nope"))
            .await
            .unwrap_err();
        let created = store
            .create_optimistic(ItemDraft::named("Aurora"))
            .await
            .unwrap();
        store.delete_optimistic("item-1").await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Created);
        assert_eq!(first.entity_id, created.id);
        let second = changes.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Deleted);
        assert_eq!(second.entity_id, "item-1");
        assert!(changes.try_recv().is_err());
    }
}
