//! Client-side entity cache for the Wardrobe console.
//!
//! One [`EntityStore`] per entity type holds an ordered list plus an id
//! index, fronted by a freshness gate that keeps redundant fetches off the
//! network. Creates and deletes are applied optimistically and rolled back
//! exactly if the data source refuses them.
//!
//! # Key Types
//!
//! - [`EntityStore`] -- reactive cache; subscribe for [`StoreSnapshot`]s
//! - [`EntitySource`] -- the network collaborator a store reads and writes through
//! - [`RefreshScheduler`] -- refreshes a store the moment its data goes stale
//! - [`CascadeHandle`] -- forwards one store's mutations as refreshes of another
//! - [`InMemorySource`] -- in-process collaborator for tests and demos
//!
//! # Design Rules
//!
//! 1. At most one fetch is in flight per store.
//! 2. Every state change is a single synchronous update; awaits happen only
//!    around data-source calls.
//! 3. A failed fetch keeps the cached data and records the error.
//! 4. A failed mutation leaves the store as if it had never been attempted.
//! 5. Cascade refreshes never fail the mutation that triggered them.

pub mod cascade;
pub mod collection;
pub mod config;
pub mod error;
pub mod freshness;
mod guard;
pub mod memory;
mod optimistic;
pub mod scheduler;
pub mod store;
pub mod traits;

pub use cascade::{link, CascadeHandle, Refreshable};
pub use collection::EntityCollection;
pub use config::{StoreConfig, DEFAULT_STALE_TIME_MS};
pub use error::{ErrorKind, SourceError, SourceResult, StoreError, StoreResult};
pub use freshness::{should_fetch, FetchMode, StoreState};
pub use memory::{InMemorySource, SourceOp};
pub use scheduler::RefreshScheduler;
pub use store::{CancelFlag, EntityStore, FetchOptions, FetchOutcome, StoreSnapshot};
pub use traits::{EntitySource, Filter};
