//! Cascade invalidation bus for the Wardrobe console.
//!
//! Stores never import each other. A store that owns a mutable ledger
//! publishes a [`StoreChange`] after each committed mutation, and any
//! store derived from that ledger subscribes at startup. Links are
//! declared on the bus so the dependency graph stays explicit and acyclic.

pub mod bus;
pub mod error;
pub mod event;
pub mod graph;

pub use bus::{BusConfig, CascadeBus, ChangeFilter, ChangeStream, Delivery};
pub use error::FabricError;
pub use event::{ChangeKind, StoreChange};
pub use graph::{CascadeGraph, CascadeLink};
