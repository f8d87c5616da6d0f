//! Offline store ports

pub mod ports;

pub use ports::{ActionQueue, EntityCache};
