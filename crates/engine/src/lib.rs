//! Divergence detection engine.
//!
//! This crate contains the pairwise divergence metric, the cooldown-based
//! duplicate filter and the analyzer that turns a price snapshot into
//! persisted findings.

pub mod analyzer;
pub mod dedup;
pub mod divergence;
pub mod error;

pub use analyzer::*;
pub use dedup::*;
pub use divergence::*;
pub use error::*;
