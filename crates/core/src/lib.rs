//! # PetSafe Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the offline store, connectivity
//!   monitoring, realtime event handling and local notifications
//!
//! ## Architecture Principles
//! - Only depends on `petsafe-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod network;
pub mod realtime;
pub mod store;

// Re-export specific items to avoid ambiguity
pub use network::ports::ConnectivityMonitor;
pub use realtime::ports::{EventHandler, Notifier};
pub use store::ports::{ActionQueue, EntityCache};
