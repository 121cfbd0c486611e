use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use wardrobe_fabric::BusConfig;
use wardrobe_store::StoreConfig;
use wardrobe_types::{Entity, OwnershipEvent};

use crate::error::{SdkError, SdkResult};

/// Longest staleness threshold accepted from a config file (one year).
pub const MAX_STALE_TIME_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

/// Console-wide configuration.
///
/// Every store starts from `defaults`; an entry in `stores` under the
/// store's collection name overrides only the fields it sets. The ledger
/// store counts its rows unless an override says otherwise.
///
/// ```toml
/// [defaults]
/// stale_time_ms = 60000
///
/// [stores.items]
/// auto_refresh = false
///
/// [bus]
/// channel_capacity = 128
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub defaults: StoreConfig,
    pub stores: BTreeMap<String, StoreOverride>,
    pub bus: BusConfig,
}

/// Per-store settings layered over [`ConsoleConfig::defaults`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_refresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_count: Option<bool>,
}

impl StoreOverride {
    pub fn apply(&self, mut base: StoreConfig) -> StoreConfig {
        if let Some(stale_time_ms) = self.stale_time_ms {
            base.stale_time_ms = stale_time_ms;
        }
        if let Some(auto_refresh) = self.auto_refresh {
            base.auto_refresh = auto_refresh;
        }
        if let Some(with_count) = self.with_count {
            base.with_count = with_count;
        }
        base
    }
}

impl ConsoleConfig {
    pub fn from_toml_str(raw: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SdkError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Effective configuration for the store named `name`.
    pub fn store(&self, name: &str) -> StoreConfig {
        let mut base = self.defaults.clone();
        if name == OwnershipEvent::COLLECTION {
            base.with_count = true;
        }
        match self.stores.get(name) {
            Some(overrides) => overrides.apply(base),
            None => base,
        }
    }

    /// Turn auto-refresh off everywhere.
    pub fn without_auto_refresh(mut self) -> Self {
        self.defaults.auto_refresh = false;
        for store in self.stores.values_mut() {
            store.auto_refresh = None;
        }
        self
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.bus.channel_capacity == 0 {
            return Err(SdkError::Config("bus.channel_capacity must be positive".into()));
        }
        let named = self
            .stores
            .keys()
            .map(|name| (name.as_str(), self.store(name)));
        for (name, store) in std::iter::once(("defaults", self.defaults.clone())).chain(named) {
            // A zero threshold with auto-refresh would refetch as soon as
            // every fetch lands.
            if store.auto_refresh && store.stale_time_ms == 0 {
                return Err(SdkError::Config(format!(
                    "{name}: stale_time_ms must be positive when auto_refresh is on"
                )));
            }
            if store.stale_time_ms > MAX_STALE_TIME_MS {
                return Err(SdkError::Config(format!(
                    "{name}: stale_time_ms must not exceed {MAX_STALE_TIME_MS}"
                )));
            }
        }
        Ok(())
    }
}
