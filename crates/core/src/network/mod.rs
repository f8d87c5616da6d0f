//! Connectivity monitoring ports

pub mod ports;

pub use ports::ConnectivityMonitor;
