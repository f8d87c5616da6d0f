//! Connectivity observation

pub mod observer;

pub use observer::NetworkObserver;
