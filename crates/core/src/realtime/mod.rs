//! Realtime event ports

pub mod ports;

pub use ports::{EventHandler, Notifier};
