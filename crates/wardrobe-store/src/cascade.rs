//! Wiring between the cascade bus and dependent stores.
//!
//! A dependent store is attached to a source store *by name*: the link
//! subscribes to the source's changes on the bus and forces a refresh of
//! the target for every committed mutation. Neither store holds a
//! reference to the other.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wardrobe_fabric::{CascadeBus, ChangeFilter, ChangeStream, FabricError};
use wardrobe_types::Entity;

use crate::error::StoreResult;
use crate::store::{EntityStore, FetchOutcome};

/// A store that can be told its data is out of date.
#[async_trait]
pub trait Refreshable: Send + Sync {
    fn name(&self) -> &str;

    /// Refresh now, bypassing the staleness check.
    async fn invalidate(&self) -> StoreResult<FetchOutcome>;
}

#[async_trait]
impl<E: Entity> Refreshable for EntityStore<E> {
    fn name(&self) -> &str {
        EntityStore::name(self)
    }

    async fn invalidate(&self) -> StoreResult<FetchOutcome> {
        EntityStore::invalidate(self).await
    }
}

/// Running link from one source store to one dependent store. Dropping
/// the handle detaches the link.
#[derive(Debug)]
pub struct CascadeHandle {
    source: String,
    target: String,
    task: JoinHandle<()>,
}

impl CascadeHandle {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CascadeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Declare `source -> target` on the bus and start forwarding the
/// source's committed mutations as forced refreshes of `target`.
///
/// Changes that arrive while a refresh is running are folded into the
/// next one. Refresh failures are logged and never reach the mutation
/// that triggered them.
pub fn link(
    bus: &CascadeBus,
    source: &str,
    target: Arc<dyn Refreshable>,
) -> Result<CascadeHandle, FabricError> {
    bus.declare_link(source, target.name())?;
    let changes = bus.subscribe(ChangeFilter::from_store(source));
    let handle = CascadeHandle {
        source: source.to_string(),
        target: target.name().to_string(),
        task: tokio::spawn(forward(source.to_string(), changes, target)),
    };
    debug!(source, target = %handle.target, "cascade link attached");
    Ok(handle)
}

async fn forward(source: String, mut changes: ChangeStream, target: Arc<dyn Refreshable>) {
    loop {
        match changes.recv().await {
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                debug!(source = %source, target = %target.name(), missed, "cascade lagged; coalescing");
            }
            Err(RecvError::Closed) => return,
        }
        let mut coalesced = 0usize;
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => coalesced += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => break,
            }
        }

        match target.invalidate().await {
            Ok(outcome) => {
                debug!(source = %source, target = %target.name(), coalesced, ?outcome, "cascade refresh done");
            }
            Err(err) => {
                warn!(source = %source, target = %target.name(), error = %err, "cascade refresh failed");
            }
        }
    }
}
