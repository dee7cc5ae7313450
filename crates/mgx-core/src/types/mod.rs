//! Shared type definitions.

pub mod enums;
pub mod events;
pub mod order;

pub use enums::*;
pub use events::*;
pub use order::*;
