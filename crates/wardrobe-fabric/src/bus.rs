use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::event::{ChangeKind, StoreChange};
use crate::graph::{CascadeGraph, CascadeLink};

/// Filter for subscribing to a subset of store changes.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// If set, only changes from these stores are delivered.
    pub stores: Option<Vec<String>>,
    /// If set, only changes of these kinds are delivered.
    pub kinds: Option<Vec<ChangeKind>>,
}

impl ChangeFilter {
    /// Changes committed by a single store.
    pub fn from_store(store: impl Into<String>) -> Self {
        Self {
            stores: Some(vec![store.into()]),
            kinds: None,
        }
    }

    /// Returns `true` if the given change matches this filter.
    pub fn matches(&self, change: &StoreChange) -> bool {
        if let Some(ref stores) = self.stores {
            if !stores.contains(&change.store) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&change.kind) {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for store changes.
pub type ChangeStream = broadcast::Receiver<StoreChange>;

/// One subscription: the receiver half lives with the subscriber.
struct Tap {
    filter: ChangeFilter,
    sender: broadcast::Sender<StoreChange>,
}

impl Tap {
    fn is_closed(&self) -> bool {
        self.sender.receiver_count() == 0
    }
}

/// What [`CascadeBus::publish`] did with one change.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub change: StoreChange,
    /// Subscribers the change was queued for.
    pub delivered: usize,
    /// Closed subscriptions dropped while publishing.
    pub pruned: usize,
}

/// Configuration for the [`CascadeBus`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of per-subscriber broadcast channels.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Publish/subscribe bus carrying committed store mutations.
///
/// A ledger store publishes a [`StoreChange`] after each confirmed
/// mutation; dependent stores subscribe at startup. The bus also records
/// the declared cascade links so the dependency structure stays visible
/// and acyclic.
pub struct CascadeBus {
    taps: RwLock<Vec<Tap>>,
    graph: RwLock<CascadeGraph>,
    config: BusConfig,
}

impl CascadeBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            taps: RwLock::new(Vec::new()),
            graph: RwLock::new(CascadeGraph::new()),
            config,
        }
    }

    /// Announce a committed mutation. Never blocks and never fails; a
    /// change nobody listens to is dropped.
    ///
    /// Fan-out runs under the read lock. The write lock is taken only when
    /// a closed subscription was seen, to drop it.
    pub fn publish(&self, store: &str, kind: ChangeKind, entity_id: &str) -> Delivery {
        let change = StoreChange::new(store, kind, entity_id);
        let mut delivered = 0;
        let mut saw_closed = false;
        for tap in self.taps.read().unwrap_or_else(PoisonError::into_inner).iter() {
            if tap.is_closed() {
                saw_closed = true;
            } else if tap.filter.matches(&change) && tap.sender.send(change.clone()).is_ok() {
                delivered += 1;
            }
        }
        let pruned = if saw_closed { self.prune() } else { 0 };
        debug!(store, kind = %change.kind, entity_id, delivered, pruned, "store change published");
        Delivery {
            change,
            delivered,
            pruned,
        }
    }

    /// Subscribe to changes matching the given filter.
    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        let (sender, stream) = broadcast::channel(self.config.channel_capacity);
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Tap { filter, sender });
        stream
    }

    fn prune(&self) -> usize {
        let mut taps = self.taps.write().unwrap_or_else(PoisonError::into_inner);
        let before = taps.len();
        taps.retain(|tap| !tap.is_closed());
        before - taps.len()
    }

    /// Record that `source`'s mutations force a refresh of `target`.
    pub fn declare_link(&self, source: &str, target: &str) -> Result<bool> {
        self.graph
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .declare(source, target)
    }

    /// Stores that must refresh when `source` commits a mutation.
    pub fn dependents_of(&self, source: &str) -> Vec<String> {
        self.graph
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .targets_of(source)
    }

    pub fn links(&self) -> Vec<CascadeLink> {
        self.graph
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .links()
    }

    /// Subscriptions currently registered, including closed ones not yet
    /// pruned by a publish.
    pub fn subscriber_count(&self) -> usize {
        self.taps.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for CascadeBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
