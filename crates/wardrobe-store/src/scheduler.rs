use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wardrobe_types::Entity;

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityStore, FetchOptions, FetchOutcome, StoreSnapshot};

/// Background task that refreshes one store when its data goes stale.
///
/// The timer is derived from `last_fetched`: whenever that changes the
/// pending deadline is replaced, so there is at most one timer per store.
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct RefreshScheduler {
    store: String,
    task: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

impl RefreshScheduler {
    pub fn store_name(&self) -> &str {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.task.abort();
        self.active.store(false, Ordering::SeqCst);
        debug!(store = %self.store, "auto-refresh stopped");
    }
}

impl<E: Entity> EntityStore<E> {
    /// Start refreshing this store whenever its data reaches the stale
    /// threshold. Fails if a scheduler is already running for the store.
    ///
    /// The task holds only a weak reference, so it ends on its own once
    /// the store is dropped.
    pub fn start_auto_refresh(self: &Arc<Self>) -> StoreResult<RefreshScheduler> {
        if self
            .scheduler_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoreError::SchedulerActive(self.name().to_string()));
        }

        let stale_time = self.config().stale_time();
        let task = tokio::spawn(run(Arc::downgrade(self), self.subscribe(), stale_time));
        info!(store = %self.name(), stale_ms = stale_time.as_millis() as u64, "auto-refresh started");
        Ok(RefreshScheduler {
            store: self.name().to_string(),
            task,
            active: Arc::clone(&self.scheduler_active),
        })
    }
}

async fn run<E: Entity>(
    store: Weak<EntityStore<E>>,
    mut rx: watch::Receiver<StoreSnapshot<E>>,
    stale_time: Duration,
) {
    // The last_fetched value a timer already fired for. A refresh that did
    // not move last_fetched (it failed, or was skipped) does not re-arm.
    let mut fired_for: Option<Instant> = None;
    loop {
        let last_fetched = rx.borrow_and_update().state.last_fetched;
        // A threshold past the clock's range never comes due.
        let deadline = match last_fetched {
            Some(at) if fired_for != Some(at) => at.checked_add(stale_time),
            _ => None,
        };

        let Some(deadline) = deadline else {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                let Some(store) = store.upgrade() else {
                    return;
                };
                fired_for = last_fetched;
                match store.fetch(FetchOptions::default()).await {
                    Ok(FetchOutcome::Fetched { count, .. }) => {
                        debug!(store = %store.name(), count, "auto-refresh fetched");
                    }
                    Ok(outcome) => {
                        debug!(store = %store.name(), ?outcome, "auto-refresh did not fetch");
                    }
                    Err(err) => {
                        warn!(store = %store.name(), error = %err, "auto-refresh failed");
                    }
                }
            }
        }
    }
}
