//! Types library for the perpetuals order book
//!
//! This library provides the core type definitions shared by the in-memory
//! order book and its collaborators. Everything here is plain data with
//! deterministic ordering and hashing.
//!
//! # Modules
//! - `ids`: Identifiers (SubaccountId, OrderId, ClobPairId)
//! - `numeric`: Integer price and size units (Subticks, BaseQuantums)
//! - `order`: Orders, statuses and removal reasons
//! - `liquidation`: Liquidation orders and the taker abstraction
//! - `clob_pair`: Market parameters
//! - `operations`: Operations queue entries and block proposals
//! - `errors`: Error taxonomy

pub mod clob_pair;
pub mod errors;
pub mod ids;
pub mod liquidation;
pub mod numeric;
pub mod operations;
pub mod order;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clob_pair::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::liquidation::*;
    pub use crate::numeric::*;
    pub use crate::operations::*;
    pub use crate::order::*;
}
