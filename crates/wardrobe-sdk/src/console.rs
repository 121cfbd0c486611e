use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use wardrobe_fabric::CascadeBus;
use wardrobe_store::{
    cascade, CascadeHandle, EntitySource, EntityStore, FetchOptions, InMemorySource,
    RefreshScheduler,
};
use wardrobe_types::{
    Cosmetic, Entity, InventorySnapshot, Item, OwnershipEvent, OwnershipEventDraft, Player,
};

use crate::aggregate::LedgerAggregateSource;
use crate::config::ConsoleConfig;
use crate::error::{SdkError, SdkResult};

/// Seed records for in-memory sources.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub players: Vec<Player>,
    pub cosmetics: Vec<Cosmetic>,
    pub items: Vec<Item>,
    pub events: Vec<OwnershipEvent>,
}

impl Fixture {
    pub fn from_json(raw: &str) -> SdkResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SdkError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }
}

/// The data-source collaborators a console reads and writes through.
///
/// Inventory snapshots have no source of their own; they are derived from
/// `events`.
#[derive(Clone)]
pub struct Sources {
    pub players: Arc<dyn EntitySource<Player>>,
    pub cosmetics: Arc<dyn EntitySource<Cosmetic>>,
    pub items: Arc<dyn EntitySource<Item>>,
    pub events: Arc<dyn EntitySource<OwnershipEvent>>,
}

impl Sources {
    /// In-process sources seeded from `fixture`.
    pub fn in_memory(fixture: Fixture) -> Self {
        Self {
            players: Arc::new(InMemorySource::with_records("player", fixture.players)),
            cosmetics: Arc::new(InMemorySource::with_records("cosmetic", fixture.cosmetics)),
            items: Arc::new(InMemorySource::with_records("item", fixture.items)),
            events: Arc::new(InMemorySource::with_records("evt", fixture.events)),
        }
    }
}

/// Every entity store of the console, constructed and wired in one place.
///
/// Committed ledger mutations reach the inventory store through the
/// cascade bus. Stores with auto-refresh enabled get a scheduler that
/// lives as long as the console. Must be created inside a tokio runtime.
pub struct Console {
    players: Arc<EntityStore<Player>>,
    cosmetics: Arc<EntityStore<Cosmetic>>,
    items: Arc<EntityStore<Item>>,
    events: Arc<EntityStore<OwnershipEvent>>,
    snapshots: Arc<EntityStore<InventorySnapshot>>,
    bus: Arc<CascadeBus>,
    _cascades: Vec<CascadeHandle>,
    schedulers: Vec<RefreshScheduler>,
}

impl Console {
    pub fn new(config: &ConsoleConfig, sources: Sources) -> SdkResult<Self> {
        config.validate()?;
        let bus = Arc::new(CascadeBus::new(config.bus.clone()));

        let players = Arc::new(build(sources.players, config, &bus));
        let cosmetics = Arc::new(build(sources.cosmetics, config, &bus));
        let items = Arc::new(build(sources.items, config, &bus));
        let events = Arc::new(build(sources.events.clone(), config, &bus));
        let snapshots = Arc::new(build::<InventorySnapshot>(
            Arc::new(LedgerAggregateSource::new(sources.events)),
            config,
            &bus,
        ));

        let cascades = vec![cascade::link(&bus, events.name(), snapshots.clone())?];

        let mut schedulers = Vec::new();
        schedule(&players, &mut schedulers)?;
        schedule(&cosmetics, &mut schedulers)?;
        schedule(&items, &mut schedulers)?;
        schedule(&events, &mut schedulers)?;
        schedule(&snapshots, &mut schedulers)?;

        info!(
            links = bus.links().len(),
            schedulers = schedulers.len(),
            "console ready"
        );
        Ok(Self {
            players,
            cosmetics,
            items,
            events,
            snapshots,
            bus,
            _cascades: cascades,
            schedulers,
        })
    }

    /// Console over in-process sources seeded from `fixture`.
    pub fn in_memory(config: &ConsoleConfig, fixture: Fixture) -> SdkResult<Self> {
        Self::new(config, Sources::in_memory(fixture))
    }

    // ---- Stores ----

    pub fn players(&self) -> &Arc<EntityStore<Player>> {
        &self.players
    }

    pub fn cosmetics(&self) -> &Arc<EntityStore<Cosmetic>> {
        &self.cosmetics
    }

    pub fn items(&self) -> &Arc<EntityStore<Item>> {
        &self.items
    }

    pub fn events(&self) -> &Arc<EntityStore<OwnershipEvent>> {
        &self.events
    }

    pub fn snapshots(&self) -> &Arc<EntityStore<InventorySnapshot>> {
        &self.snapshots
    }

    pub fn bus(&self) -> &Arc<CascadeBus> {
        &self.bus
    }

    /// Names of the stores with a running auto-refresh scheduler.
    pub fn auto_refreshing(&self) -> Vec<&str> {
        self.schedulers.iter().map(RefreshScheduler::store_name).collect()
    }

    // ---- Operations ----

    /// Fetch every store that is stale, concurrently.
    pub async fn load_all(&self) -> SdkResult<()> {
        tokio::try_join!(
            self.players.fetch(FetchOptions::default()),
            self.cosmetics.fetch(FetchOptions::default()),
            self.items.fetch(FetchOptions::default()),
            self.events.fetch(FetchOptions::default()),
            self.snapshots.fetch(FetchOptions::default()),
        )?;
        Ok(())
    }

    /// Record a grant in the ledger. Player and item keys are resolved to
    /// internal ids when they match a cached entity and kept as given
    /// otherwise.
    pub async fn grant(
        &self,
        player: &str,
        item: &str,
        quantity: u32,
    ) -> SdkResult<Arc<OwnershipEvent>> {
        let draft = OwnershipEventDraft::grant(self.player_ref(player), self.item_ref(item));
        self.record(OwnershipEventDraft { quantity, ..draft }).await
    }

    pub async fn revoke(
        &self,
        player: &str,
        item: &str,
        quantity: u32,
    ) -> SdkResult<Arc<OwnershipEvent>> {
        let draft = OwnershipEventDraft::revoke(self.player_ref(player), self.item_ref(item));
        self.record(OwnershipEventDraft { quantity, ..draft }).await
    }

    /// Cached inventory rows for a player, by any of the player's keys.
    pub fn inventory_of(&self, player: &str) -> Vec<Arc<InventorySnapshot>> {
        let player_id = self.player_ref(player);
        self.snapshots
            .entities()
            .into_iter()
            .filter(|s| s.player_id == player_id)
            .collect()
    }

    async fn record(&self, draft: OwnershipEventDraft) -> SdkResult<Arc<OwnershipEvent>> {
        Ok(self.events.create_optimistic(draft).await?)
    }

    fn player_ref(&self, key: &str) -> String {
        self.players
            .resolve(key)
            .map_or_else(|| key.to_string(), |p| p.id.clone())
    }

    fn item_ref(&self, key: &str) -> String {
        self.items
            .resolve(key)
            .map_or_else(|| key.to_string(), |i| i.id.clone())
    }
}

fn build<E: Entity>(
    source: Arc<dyn EntitySource<E>>,
    config: &ConsoleConfig,
    bus: &Arc<CascadeBus>,
) -> EntityStore<E> {
    EntityStore::new(source, config.store(E::COLLECTION)).with_bus(Arc::clone(bus))
}

fn schedule<E: Entity>(
    store: &Arc<EntityStore<E>>,
    schedulers: &mut Vec<RefreshScheduler>,
) -> SdkResult<()> {
    if store.config().auto_refresh {
        schedulers.push(store.start_auto_refresh()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use wardrobe_store::{ErrorKind, SourceError, SourceOp, StoreError};
    use wardrobe_types::{is_temp_id, ItemDraft, PlayerDraft};

    use super::*;

    struct Harness {
        console: Console,
        items: Arc<InMemorySource<Item>>,
        events: Arc<InMemorySource<OwnershipEvent>>,
    }

    fn harness(config: &ConsoleConfig) -> Harness {
        let now = Utc::now();
        let players = Arc::new(InMemorySource::with_records(
            "player",
            vec![
                Player::from_draft(
                    "player-1".into(),
                    &PlayerDraft::new("Nova").with_external_id("STEAM_0:1:42"),
                    now,
                ),
                Player::from_draft("player-2".into(), &PlayerDraft::new("Vega"), now),
            ],
        ));
        let items = Arc::new(
            InMemorySource::with_records(
                "real",
                vec![Item::from_draft(
                    "item-1".into(),
                    &ItemDraft {
                        sku: Some("SKU-EMBER".into()),
                        ..ItemDraft::named("Ember")
                    },
                    now,
                )],
            )
            .with_next_id(42),
        );
        let events = Arc::new(InMemorySource::<OwnershipEvent>::new("evt"));
        let sources = Sources {
            players,
            cosmetics: Arc::new(InMemorySource::new("cosmetic")),
            items: items.clone(),
            events: events.clone(),
        };
        Harness {
            console: Console::new(config, sources).unwrap(),
            items,
            events,
        }
    }

    fn quiet() -> ConsoleConfig {
        ConsoleConfig::default().without_auto_refresh()
    }

    // With paused time the clock only advances once every task is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn wires_ledger_to_inventory() {
        let h = harness(&ConsoleConfig::default());
        let links = h.console.bus().links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, "events");
        assert_eq!(links[0].target, "snapshots");
        assert_eq!(h.console.auto_refreshing().len(), 5);

        let quiet = harness(&quiet());
        assert!(quiet.console.auto_refreshing().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_item_create_gets_real_id() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        let items = h.console.items();

        let created = items.create_optimistic(ItemDraft::named("Aurora")).await.unwrap();
        assert_eq!(created.id, "real-42");
        assert_eq!(items.get_by_id("real-42").unwrap().name, "Aurora");
        assert!(items.entities().iter().all(|i| !is_temp_id(&i.id)));
        assert_eq!(h.items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn conflicting_create_leaves_store_unchanged() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        let before = h.console.items().len();

        h.items
            .fail_next(SourceOp::Create, SourceError::Conflict("conflict".into()));
        let err = h
            .console
            .items()
            .create_optimistic(ItemDraft::named("Aurora"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "conflict");
        assert_eq!(h.console.items().len(), before);
        assert!(h.console.items().optimistic_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn grant_refreshes_inventory_once_after_resolving() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        // Ledger fetch plus the aggregate's read of the ledger.
        let baseline = h.events.calls(SourceOp::FetchAll);
        assert_eq!(baseline, 2);

        let event = h.console.grant("steam_0:1:42", "ember", 2).await.unwrap();
        assert_eq!(event.player_id, "player-1");
        assert_eq!(event.item_id, "item-1");
        // The mutation has resolved; the cascade has not run yet.
        assert_eq!(h.events.calls(SourceOp::FetchAll), baseline);
        assert!(h.console.snapshots().is_empty());

        settle().await;
        assert_eq!(h.events.calls(SourceOp::FetchAll), baseline + 1);
        let inventory = h.console.inventory_of("Nova");
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].quantity, 2);

        settle().await;
        assert_eq!(h.events.calls(SourceOp::FetchAll), baseline + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_grant_does_not_cascade() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        let baseline = h.events.calls(SourceOp::FetchAll);

        h.events
            .fail_next(SourceOp::Create, SourceError::Network("offline".into()));
        let err = h.console.grant("Vega", "Ember", 1).await.unwrap_err();
        assert!(matches!(err, SdkError::Store(StoreError::Source(_))));
        assert!(h.console.events().is_empty());

        settle().await;
        assert_eq!(h.events.calls(SourceOp::FetchAll), baseline);
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_failure_stays_out_of_the_mutation() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();

        // The aggregate's read of the ledger fails; the grant still succeeds.
        h.events
            .fail_next(SourceOp::FetchAll, SourceError::Network("ledger offline".into()));
        h.console.grant("Vega", "Ember", 1).await.unwrap();
        settle().await;

        let state = h.console.snapshots().state();
        assert_eq!(state.error.as_deref(), Some("ledger offline"));
        assert_eq!(state.error_kind, Some(ErrorKind::Network));
        assert_eq!(h.console.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn revoke_nets_out_inventory() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();

        h.console.grant("player-2", "item-1", 1).await.unwrap();
        settle().await;
        assert_eq!(h.console.inventory_of("vega").len(), 1);

        h.console.revoke("player-2", "item-1", 1).await.unwrap();
        settle().await;
        assert!(h.console.inventory_of("vega").is_empty());
        assert_eq!(h.console.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_a_ledger_entry_cascades() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        let event = h.console.grant("Nova", "Ember", 1).await.unwrap();
        settle().await;
        assert_eq!(h.console.snapshots().len(), 1);

        h.console.events().delete_optimistic(&event.id).await.unwrap();
        settle().await;
        assert!(h.console.snapshots().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ledger_fetch_is_counted() {
        let h = harness(&quiet());
        h.console.load_all().await.unwrap();
        assert_eq!(h.console.events().total_count(), Some(0));
        assert_eq!(h.console.players().total_count(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn schedulers_refresh_stale_stores() {
        let h = harness(&ConsoleConfig::default());
        h.console.load_all().await.unwrap();
        let before = h.items.calls(SourceOp::FetchAll);

        tokio::time::sleep(Duration::from_millis(300_001)).await;
        assert_eq!(h.items.calls(SourceOp::FetchAll), before + 1);
    }

    #[tokio::test]
    async fn fixture_seeds_in_memory_console() {
        let raw = r#"{
            "players": [
                {"id": "p-1", "username": "Nova", "external_id": null,
                 "created_at": "2024-01-01T00:00:00Z"}
            ],
            "items": [
                {"id": "i-1", "name": "Ember", "cosmetic_id": null, "sku": null,
                 "created_at": "2024-01-01T00:00:00Z"}
            ]
        }"#;
        let fixture = Fixture::from_json(raw).unwrap();
        let console = Console::in_memory(&quiet(), fixture).unwrap();
        console.load_all().await.unwrap();
        assert_eq!(console.players().len(), 1);
        assert_eq!(console.items().resolve("EMBER").unwrap().id, "i-1");
        assert!(console.cosmetics().is_empty());
    }

    #[tokio::test]
    async fn demo_seed_projects_inventory() {
        let fixture = Fixture::from_json(include_str!("../../../demos/seed.json")).unwrap();
        let console = Console::in_memory(&quiet(), fixture).unwrap();
        console.load_all().await.unwrap();

        let nova = console.inventory_of("steam_0:1:42");
        assert_eq!(nova.len(), 1);
        assert_eq!(nova[0].quantity, 1);
        assert_eq!(console.events().total_count(), Some(3));
        assert_eq!(console.items().resolve("sku-ember-01").unwrap().id, "item-1");
    }

    #[test]
    fn bad_fixture_is_reported() {
        let err = Fixture::from_json("{\"players\": 3}").unwrap_err();
        assert!(matches!(err, SdkError::Fixture(_)));
    }
}
