//! Common data types used throughout the application

pub mod actions;
pub mod entities;
pub mod events;
pub mod sync;

pub use actions::*;
pub use entities::*;
pub use events::*;
pub use sync::*;
