//! In-memory CLOB for perpetual futures
//!
//! Price-time priority order books, one per market, with short-term
//! cancellations, an operations queue for block proposals and replay, and
//! off-chain order updates. Balances, positions and fill amounts are owned by
//! the keeper installed with [`MemClob::set_keeper`].
//!
//! **Key Invariants:**
//! - No book is left crossed after a public operation
//! - Makers at one price fill in arrival order
//! - No fill between two orders of the same subaccount
//! - Fill-or-kill and post-only rejections leave the book unchanged
//! - Replaying the operations queue is deterministic

pub mod book;
pub mod config;
pub mod keeper;
pub mod ledger;
pub mod matching;
pub mod memclob;
pub mod offchain;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{MemClobConfig, ReplayPostOnlyPolicy};
pub use keeper::{ClobKeeper, CollateralCheck, RiskLimit};
pub use ledger::OperationsLedger;
pub use memclob::{LiquidationOutcome, MemClob, PlaceOrderOutcome, PricePremiumParams, ReplayStats};
pub use offchain::{OffchainMessage, RemovalStatus};
