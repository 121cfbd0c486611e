use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wardrobe_fabric::{CascadeBus, ChangeKind};
use wardrobe_types::{is_temp_id, Entity, LooseKeyed};

use crate::collection::EntityCollection;
use crate::config::StoreConfig;
use crate::error::{SourceError, StoreResult};
use crate::freshness::{
    begin_fetch, clear_in_flight, finish_failure, finish_success, is_in_flight, should_fetch,
    FetchMode, StoreState,
};
use crate::guard::Rollback;
use crate::traits::{EntitySource, Filter};

/// Everything a subscriber can observe about one store.
#[derive(Clone, Debug)]
pub struct StoreSnapshot<E> {
    pub collection: EntityCollection<E>,
    pub state: StoreState,
    /// Ids of unconfirmed optimistic mutations: temp ids of pending
    /// creates and real ids of pending deletes.
    pub optimistic: BTreeSet<String>,
    /// Row count reported by the source, for counted stores.
    pub total_count: Option<u64>,
}

impl<E> Default for StoreSnapshot<E> {
    fn default() -> Self {
        Self {
            collection: EntityCollection::default(),
            state: StoreState::default(),
            optimistic: BTreeSet::new(),
            total_count: None,
        }
    }
}

impl<E: Entity> StoreSnapshot<E> {
    /// Whether a fetch should show as a background refresh rather than a
    /// cold load.
    pub fn has_data(&self) -> bool {
        self.state.last_fetched.is_some() || !self.collection.is_empty()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.optimistic.contains(id)
    }
}

/// Shared flag a caller sets to discard the result of its fetch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Bypass the staleness check (never the in-flight check).
    pub force_refresh: bool,
    pub cancel: Option<CancelFlag>,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
            cancel: None,
        }
    }

    pub fn cancellable(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The freshness gate declined; no network call was made.
    Skipped,
    /// New data was committed.
    Fetched { mode: FetchMode, count: usize },
    /// The caller cancelled before the call resolved; nothing was committed.
    Discarded,
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }
}

/// Reactive cache for one entity type.
///
/// All state lives in a single [`StoreSnapshot`] behind a watch channel.
/// Every mutation is one synchronous update of that snapshot, so a
/// subscriber never sees the list and index out of step. Network calls
/// are the only suspension points.
pub struct EntityStore<E: Entity> {
    name: String,
    source: Arc<dyn EntitySource<E>>,
    config: StoreConfig,
    tx: watch::Sender<StoreSnapshot<E>>,
    bus: Option<Arc<CascadeBus>>,
    pub(crate) scheduler_active: Arc<AtomicBool>,
}

impl<E: Entity> EntityStore<E> {
    pub fn new(source: Arc<dyn EntitySource<E>>, config: StoreConfig) -> Self {
        let (tx, _rx) = watch::channel(StoreSnapshot::default());
        Self {
            name: E::COLLECTION.to_string(),
            source,
            config,
            tx,
            bus: None,
            scheduler_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the store name used on the cascade bus and in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Publish committed mutations on `bus`.
    pub fn with_bus(mut self, bus: Arc<CascadeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- Reads ----

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot<E>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot<E> {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> StoreState {
        self.tx.borrow().state.clone()
    }

    pub fn entities(&self) -> Vec<Arc<E>> {
        self.tx.borrow().collection.entities().to_vec()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().collection.is_empty()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.tx.borrow().total_count
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<E>> {
        self.tx.borrow().collection.get(id).cloned()
    }

    /// Entities for `ids` in the requested order; misses are dropped.
    pub fn get_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Arc<E>> {
        self.tx.borrow().collection.get_many(ids)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.tx.borrow().is_pending(id)
    }

    pub fn optimistic_ids(&self) -> BTreeSet<String> {
        self.tx.borrow().optimistic.clone()
    }

    // ---- Local mutations ----

    /// Replace the cached list in one step and mark the data fresh.
    ///
    /// Pending optimistic mutations survive the replacement the same way
    /// they survive a fetch.
    pub fn set_entities(&self, entities: Vec<E>) {
        let entities = entities.into_iter().map(Arc::new).collect();
        self.tx.send_modify(|snap| {
            commit_fetched(snap, entities);
            snap.state.last_fetched = Some(Instant::now());
            snap.state.error = None;
            snap.state.error_kind = None;
        });
    }

    /// Append an entity, replacing any cached entity with the same id.
    pub fn add_entity(&self, entity: E) -> Arc<E> {
        let entity = Arc::new(entity);
        self.tx.send_modify(|snap| {
            snap.collection.upsert(Arc::clone(&entity));
        });
        entity
    }

    /// Patch a cached entity. No-op if `id` is absent.
    pub fn update_entity(&self, id: &str, patch: impl FnOnce(&mut E)) -> bool {
        self.tx
            .send_if_modified(|snap| snap.collection.update(id, patch))
    }

    /// Drop a cached entity. No-op if `id` is absent.
    pub fn remove_entity(&self, id: &str) -> Option<Arc<E>> {
        let mut removed = None;
        self.tx.send_if_modified(|snap| {
            removed = snap.collection.remove(id).map(|(_, e)| e);
            removed.is_some()
        });
        removed
    }

    // ---- Fetching ----

    /// Fetch everything from the source unless the freshness gate says the
    /// cache is good enough or a fetch is already running.
    ///
    /// On failure the cached list is kept and the error is recorded in the
    /// state before being returned.
    pub async fn fetch(&self, options: FetchOptions) -> StoreResult<FetchOutcome> {
        let now = Instant::now();
        let stale_time = self.config.stale_time();
        let mut claimed = None;
        self.tx.send_if_modified(|snap| {
            if !should_fetch(&snap.state, options.force_refresh, stale_time, now) {
                return false;
            }
            let has_data = snap.has_data();
            claimed = Some(begin_fetch(&mut snap.state, has_data));
            true
        });
        let Some(mode) = claimed else {
            debug!(store = %self.name, force = options.force_refresh, "fetch skipped by freshness gate");
            return Ok(FetchOutcome::Skipped);
        };

        let in_flight = Rollback::new(|| {
            self.tx.send_modify(|snap| clear_in_flight(&mut snap.state));
        });
        let result = self.load_all().await;
        in_flight.disarm();

        if options.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            self.tx.send_modify(|snap| clear_in_flight(&mut snap.state));
            debug!(store = %self.name, "fetch result discarded after cancellation");
            return Ok(FetchOutcome::Discarded);
        }

        match result {
            Ok((entities, count)) => {
                let fetched = entities.len();
                let entities = entities.into_iter().map(Arc::new).collect();
                self.tx.send_modify(|snap| {
                    commit_fetched(snap, entities);
                    if count.is_some() {
                        snap.total_count = count;
                    }
                    finish_success(&mut snap.state, Instant::now());
                });
                info!(store = %self.name, count = fetched, ?mode, "fetch committed");
                Ok(FetchOutcome::Fetched {
                    mode,
                    count: fetched,
                })
            }
            Err(err) => {
                self.tx
                    .send_modify(|snap| finish_failure(&mut snap.state, &err));
                warn!(store = %self.name, kind = ?err.kind(), error = %err, "fetch failed; keeping cached data");
                Err(err.into())
            }
        }
    }

    /// Fetch regardless of staleness (still a no-op while in flight).
    pub async fn refresh(&self) -> StoreResult<FetchOutcome> {
        self.fetch(FetchOptions::forced()).await
    }

    /// Forced refresh that, if a fetch is already running, waits for it to
    /// settle and then fetches again, so the result reflects every change
    /// committed before this call.
    pub async fn invalidate(&self) -> StoreResult<FetchOutcome> {
        loop {
            match self.fetch(FetchOptions::forced()).await? {
                FetchOutcome::Skipped => {
                    let mut rx = self.subscribe();
                    if rx.wait_for(|snap| !is_in_flight(&snap.state)).await.is_err() {
                        return Ok(FetchOutcome::Skipped);
                    }
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Fetch and cache the given ids that are not cached yet.
    ///
    /// Ids with a pending optimistic mutation are neither requested nor
    /// committed, so a pending delete cannot be undone by a partial load.
    pub async fn load_missing<S: AsRef<str>>(&self, ids: &[S]) -> StoreResult<Vec<Arc<E>>> {
        let missing: Vec<String> = {
            let snap = self.tx.borrow();
            ids.iter()
                .map(AsRef::as_ref)
                .filter(|id| {
                    !is_temp_id(id) && !snap.collection.contains(id) && !snap.is_pending(id)
                })
                .map(str::to_string)
                .collect()
        };
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self.source.fetch_by_ids(&missing).await.map_err(|err| {
            warn!(store = %self.name, error = %err, "partial load failed");
            err
        })?;
        let mut loaded = Vec::with_capacity(fetched.len());
        self.tx.send_if_modified(|snap| {
            for entity in fetched {
                if snap.is_pending(entity.id()) {
                    debug!(store = %self.name, id = entity.id(), "partial load skipped pending id");
                    continue;
                }
                let entity = Arc::new(entity);
                snap.collection.upsert(Arc::clone(&entity));
                loaded.push(entity);
            }
            !loaded.is_empty()
        });
        debug!(store = %self.name, requested = missing.len(), loaded = loaded.len(), "partial load committed");
        Ok(loaded)
    }

    /// Filtered read straight from the source. The cache is not touched.
    pub async fn query(&self, filter: &Filter) -> StoreResult<Vec<E>> {
        Ok(self.source.fetch_all(Some(filter)).await?)
    }

    async fn load_all(&self) -> Result<(Vec<E>, Option<u64>), SourceError> {
        if self.config.with_count {
            tokio::try_join!(self.source.fetch_all(None), self.source.count())
        } else {
            Ok((self.source.fetch_all(None).await?, None))
        }
    }

    // ---- Crate internals ----

    pub(crate) fn source(&self) -> &Arc<dyn EntitySource<E>> {
        &self.source
    }

    pub(crate) fn sender(&self) -> &watch::Sender<StoreSnapshot<E>> {
        &self.tx
    }

    pub(crate) fn publish(&self, kind: ChangeKind, entity_id: &str) {
        if let Some(bus) = &self.bus {
            bus.publish(&self.name, kind, entity_id);
        }
    }
}

/// Replace the list with fetched data while keeping pending optimistic
/// mutations visible: placeholders stay listed and pending deletes stay
/// hidden until their network calls settle.
fn commit_fetched<E: Entity>(snap: &mut StoreSnapshot<E>, fetched: Vec<Arc<E>>) {
    let placeholders: Vec<Arc<E>> = snap
        .optimistic
        .iter()
        .filter(|id| is_temp_id(id))
        .filter_map(|id| snap.collection.get(id).cloned())
        .collect();
    snap.collection.replace(fetched);
    for id in snap.optimistic.iter().filter(|id| !is_temp_id(id)) {
        snap.collection.remove(id);
    }
    for placeholder in placeholders {
        snap.collection.upsert(placeholder);
    }
}

impl<E: LooseKeyed> EntityStore<E> {
    /// Resolve a loose foreign key: id, then external identifier, then
    /// display name.
    pub fn resolve(&self, key: &str) -> Option<Arc<E>> {
        self.tx.borrow().collection.resolve(key).cloned()
    }
}
