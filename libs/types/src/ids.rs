//! Identifier types for order book entities
//!
//! Identifiers are plain structured values (no random components) so that every
//! validator derives identical orderings. All of them implement `Ord` for
//! deterministic iteration over sets and maps keyed by them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order flag value for short-term orders (expire by block height).
pub const ORDER_FLAGS_SHORT_TERM: u32 = 0;
/// Order flag value for conditional orders (stateful, triggered by price).
pub const ORDER_FLAGS_CONDITIONAL: u32 = 32;
/// Order flag value for long-term orders (stateful, expire by block time).
pub const ORDER_FLAGS_LONG_TERM: u32 = 64;

/// Identifier of a trading account.
///
/// A single owner address may control several numbered subaccounts. Two orders
/// share an owner for self-trade purposes when their subaccount ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubaccountId {
    pub owner: String,
    pub number: u32,
}

impl SubaccountId {
    pub fn new(owner: impl Into<String>, number: u32) -> Self {
        Self {
            owner: owner.into(),
            number,
        }
    }
}

impl fmt::Display for SubaccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.number)
    }
}

/// Market (CLOB pair) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClobPairId(pub u32);

impl ClobPairId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClobPairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClobPairId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for an order
///
/// The tuple (subaccount, client id, flags, market) identifies an order across
/// its whole lifetime, including replacements. Replacements keep the id and
/// increase the order's replacement key instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId {
    pub subaccount_id: SubaccountId,
    pub client_id: u32,
    pub order_flags: u32,
    pub clob_pair_id: ClobPairId,
}

impl OrderId {
    pub fn new(
        subaccount_id: SubaccountId,
        client_id: u32,
        order_flags: u32,
        clob_pair_id: ClobPairId,
    ) -> Self {
        Self {
            subaccount_id,
            client_id,
            order_flags,
            clob_pair_id,
        }
    }

    /// Short-term orders live only in memory and expire by block height.
    pub fn is_short_term(&self) -> bool {
        self.order_flags == ORDER_FLAGS_SHORT_TERM
    }

    /// Stateful (long-lived) orders are persisted and removed explicitly.
    pub fn is_stateful(&self) -> bool {
        !self.is_short_term()
    }

    pub fn is_conditional(&self) -> bool {
        self.order_flags == ORDER_FLAGS_CONDITIONAL
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.subaccount_id, self.client_id, self.order_flags, self.clob_pair_id
        )
    }
}
