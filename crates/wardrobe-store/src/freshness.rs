//! Freshness gate: decides whether a fetch should reach the data source.
//!
//! All functions are pure over [`StoreState`] and an explicit `now`, so the
//! store can evaluate and claim the gate inside a single state update.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ErrorKind, SourceError};

/// Loading and freshness bookkeeping for one store.
///
/// `is_loading` and `is_refreshing` are never both set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreState {
    /// Cold fetch in flight (nothing cached yet).
    pub is_loading: bool,
    /// Background refresh in flight (cached data still shown).
    pub is_refreshing: bool,
    /// Message of the last failed fetch, cleared on success.
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Completion time of the last successful fetch.
    pub last_fetched: Option<Instant>,
}

/// Which flag a fetch raised when it passed the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    Loading,
    Refreshing,
}

pub fn is_in_flight(state: &StoreState) -> bool {
    state.is_loading || state.is_refreshing
}

/// Returns `true` if nothing has been fetched yet or the last fetch is at
/// least `stale_time` old.
pub fn is_stale(state: &StoreState, stale_time: Duration, now: Instant) -> bool {
    match state.last_fetched {
        None => true,
        Some(at) => now.saturating_duration_since(at) >= stale_time,
    }
}

/// At most one fetch is in flight per store; a forced fetch only bypasses
/// the staleness check.
pub fn should_fetch(
    state: &StoreState,
    force_refresh: bool,
    stale_time: Duration,
    now: Instant,
) -> bool {
    if is_in_flight(state) {
        return false;
    }
    force_refresh || is_stale(state, stale_time, now)
}

/// Claim the gate. Must directly follow a positive [`should_fetch`].
pub fn begin_fetch(state: &mut StoreState, has_data: bool) -> FetchMode {
    if has_data {
        state.is_loading = false;
        state.is_refreshing = true;
        FetchMode::Refreshing
    } else {
        state.is_loading = true;
        state.is_refreshing = false;
        FetchMode::Loading
    }
}

pub fn finish_success(state: &mut StoreState, now: Instant) {
    clear_in_flight(state);
    state.error = None;
    state.error_kind = None;
    state.last_fetched = Some(now);
}

pub fn finish_failure(state: &mut StoreState, err: &SourceError) {
    clear_in_flight(state);
    state.error = Some(err.message().to_string());
    state.error_kind = Some(err.kind());
}

pub fn clear_in_flight(state: &mut StoreState) {
    state.is_loading = false;
    state.is_refreshing = false;
}
