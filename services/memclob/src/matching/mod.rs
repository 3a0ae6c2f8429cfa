//! Matching logic module
//!
//! Implements the price-time priority taker walk

pub mod crossing;
pub mod reduce_only;
pub mod walk;

pub use crossing::{can_match, is_crossed};
pub use walk::{MakerEviction, MatchingEngine, WalkOutcome};
