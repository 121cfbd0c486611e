use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Staleness threshold used by every store unless overridden.
pub const DEFAULT_STALE_TIME_MS: u64 = 300_000;

/// Per-store cache behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Age after which cached data is eligible for a refresh.
    pub stale_time_ms: u64,
    /// Whether the store re-fetches on its own when data goes stale.
    pub auto_refresh: bool,
    /// Whether fetches also request the aggregate count.
    pub with_count: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            auto_refresh: true,
            with_count: false,
        }
    }
}

impl StoreConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_ms = u64::try_from(stale_time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn counted(mut self) -> Self {
        self.with_count = true;
        self
    }
}
