//! Core data types for the divergence bot.
//!
//! Holds the watched pair, price snapshot and finding types shared by every
//! crate, plus the storage traits the detection pipeline consumes.

pub mod finding;
pub mod memory;
pub mod pair;
pub mod price;
pub mod settings;
pub mod store;

pub use finding::*;
pub use memory::MemoryStore;
pub use pair::*;
pub use price::*;
pub use settings::*;
pub use store::*;
