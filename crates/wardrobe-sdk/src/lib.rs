//! Wardrobe console assembly.
//!
//! [`Console`] builds one entity store per record type at startup, attaches
//! them to a shared cascade bus, links the ownership ledger to the derived
//! inventory store, and starts auto-refresh where configured. This is the
//! entry point for applications embedding the cache.

pub mod aggregate;
pub mod config;
pub mod console;
pub mod error;

pub use aggregate::{project_inventory, LedgerAggregateSource};
pub use config::{ConsoleConfig, StoreOverride, MAX_STALE_TIME_MS};
pub use console::{Console, Fixture, Sources};
pub use error::{SdkError, SdkResult};

// Re-export key types
pub use wardrobe_store::{
    EntitySource, EntityStore, FetchOptions, FetchOutcome, InMemorySource, StoreConfig,
    StoreError, StoreSnapshot,
};
pub use wardrobe_types::{
    Cosmetic, InventorySnapshot, Item, OwnershipEvent, Player,
};
