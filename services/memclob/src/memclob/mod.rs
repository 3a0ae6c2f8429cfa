//! Order book facade
//!
//! `MemClob` owns one [`Orderbook`] and one [`CancellationTable`] per market,
//! the [`OperationsLedger`] for the current block and the off-chain outbox.
//! Every public operation that touches the books runs against the installed
//! keeper and leaves no book crossed.

mod lifecycle;
mod placement;
mod pricing;
mod validation;

pub use lifecycle::ReplayStats;
pub use placement::{LiquidationOutcome, PlaceOrderOutcome};
pub use pricing::PricePremiumParams;

use std::collections::{BTreeMap, HashMap};
use tracing::{error, info};
use types::clob_pair::ClobPair;
use types::errors::{ClobError, InvariantViolation};
use types::ids::{ClobPairId, OrderId, SubaccountId};
use types::numeric::{BaseQuantums, Subticks};
use types::operations::{InternalOperation, ProposedOperation};
use types::order::{Order, OrderHash, Side};

use crate::book::{CancellationTable, Orderbook, OrderbookSnapshot};
use crate::config::MemClobConfig;
use crate::keeper::{remaining_amount, ClobKeeper};
use crate::ledger::OperationsLedger;
use crate::matching::is_crossed;
use crate::offchain::{OffchainMessage, OffchainOutbox};

/// Book and short-term cancellations of one market
#[derive(Debug, Clone)]
struct MarketState {
    book: Orderbook,
    cancels: CancellationTable,
}

/// In-memory central limit order book across all markets
pub struct MemClob<K> {
    config: MemClobConfig,
    markets: BTreeMap<ClobPairId, MarketState>,
    ledger: OperationsLedger,
    outbox: OffchainOutbox,
    keeper: Option<K>,
}

impl<K: ClobKeeper> MemClob<K> {
    pub fn new(config: MemClobConfig) -> Self {
        let outbox = OffchainOutbox::new(&config);
        Self {
            config,
            markets: BTreeMap::new(),
            ledger: OperationsLedger::new(),
            outbox,
            keeper: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MemClobConfig::default())
    }

    pub fn config(&self) -> &MemClobConfig {
        &self.config
    }

    /// Install the keeper. Must happen before any order is placed.
    pub fn set_keeper(&mut self, keeper: K) {
        self.keeper = Some(keeper);
    }

    pub fn keeper(&self) -> Option<&K> {
        self.keeper.as_ref()
    }

    pub fn keeper_mut(&mut self) -> Option<&mut K> {
        self.keeper.as_mut()
    }

    /// Register a new market with an empty book.
    pub fn create_market(&mut self, clob_pair: ClobPair) -> Result<(), ClobError> {
        if clob_pair.subticks_per_tick == 0 {
            return Err(ClobError::InvalidMarket {
                reason: format!("market {} has zero subticks per tick", clob_pair.id),
            });
        }
        if clob_pair.min_order_base_quantums.is_zero() {
            return Err(ClobError::InvalidMarket {
                reason: format!("market {} has zero minimum order size", clob_pair.id),
            });
        }
        if clob_pair.step_base_quantums.is_zero() {
            return Err(ClobError::InvalidMarket {
                reason: format!("market {} has zero step size", clob_pair.id),
            });
        }
        if self.markets.contains_key(&clob_pair.id) {
            return Err(ClobError::MarketAlreadyExists {
                clob_pair_id: clob_pair.id,
            });
        }

        info!(clob_pair_id = %clob_pair.id, perpetual_id = clob_pair.perpetual_id, "Created market");
        self.markets.insert(
            clob_pair.id,
            MarketState {
                book: Orderbook::new(clob_pair),
                cancels: CancellationTable::new(),
            },
        );
        Ok(())
    }

    /// Create the market unless it already exists. Returns whether it was created.
    pub fn maybe_create_market(&mut self, clob_pair: ClobPair) -> Result<bool, ClobError> {
        if self.markets.contains_key(&clob_pair.id) {
            return Ok(false);
        }
        self.create_market(clob_pair)?;
        Ok(true)
    }

    pub fn has_market(&self, clob_pair_id: ClobPairId) -> bool {
        self.markets.contains_key(&clob_pair_id)
    }

    pub fn orderbook(&self, clob_pair_id: ClobPairId) -> Option<&Orderbook> {
        self.markets.get(&clob_pair_id).map(|market| &market.book)
    }

    /// Resting order with this id, if any.
    pub fn get_order(&self, order_id: &OrderId) -> Option<&Order> {
        self.markets
            .get(&order_id.clob_pair_id)
            .and_then(|market| market.book.get(order_id))
    }

    /// Block through which a short-term order id is canceled.
    pub fn get_cancel(&self, order_id: &OrderId) -> Option<u32> {
        self.markets
            .get(&order_id.clob_pair_id)
            .and_then(|market| market.cancels.lookup(order_id))
    }

    pub fn get_subaccount_orders(
        &self,
        clob_pair_id: ClobPairId,
        subaccount_id: &SubaccountId,
        side: Side,
    ) -> Result<Vec<Order>, ClobError> {
        Ok(self.market(clob_pair_id)?.book.orders_for(subaccount_id, side)?)
    }

    pub fn best_prices(&self, clob_pair_id: ClobPairId) -> Result<(Option<Subticks>, Option<Subticks>), ClobError> {
        Ok(self.market(clob_pair_id)?.book.best_prices())
    }

    pub fn depth_snapshot(&self, clob_pair_id: ClobPairId, depth: usize) -> Result<OrderbookSnapshot, ClobError> {
        Ok(self.market(clob_pair_id)?.book.depth_snapshot(depth))
    }

    pub fn get_order_filled_amount(&self, order_id: &OrderId) -> Result<BaseQuantums, ClobError> {
        Ok(self.require_keeper()?.filled_amount(order_id).unwrap_or_default())
    }

    /// Unfilled size of `order`, `None` once it is fully filled.
    pub fn get_order_remaining_amount(&self, order: &Order) -> Result<Option<BaseQuantums>, ClobError> {
        Ok(remaining_amount(self.require_keeper()?, order))
    }

    pub fn ledger(&self) -> &OperationsLedger {
        &self.ledger
    }

    pub fn get_operations_to_propose(&self) -> Result<Vec<ProposedOperation>, ClobError> {
        Ok(self.ledger.operations_to_propose()?)
    }

    pub fn get_operations_to_replay(&self) -> (Vec<InternalOperation>, HashMap<OrderHash, Vec<u8>>) {
        self.ledger.operations_to_replay()
    }

    /// Drain buffered off-chain messages.
    pub fn take_offchain_updates(&mut self) -> Vec<OffchainMessage> {
        self.outbox.drain()
    }

    fn market(&self, clob_pair_id: ClobPairId) -> Result<&MarketState, ClobError> {
        self.markets
            .get(&clob_pair_id)
            .ok_or(ClobError::MarketNotFound { clob_pair_id })
    }

    fn market_mut(&mut self, clob_pair_id: ClobPairId) -> Result<&mut MarketState, ClobError> {
        self.markets
            .get_mut(&clob_pair_id)
            .ok_or(ClobError::MarketNotFound { clob_pair_id })
    }

    fn require_keeper(&self) -> Result<&K, ClobError> {
        self.keeper.as_ref().ok_or(ClobError::KeeperNotSet)
    }

    fn require_keeper_mut(&mut self) -> Result<&mut K, ClobError> {
        self.keeper.as_mut().ok_or(ClobError::KeeperNotSet)
    }

    /// Remove a resting order. Tx bytes of a short-term order go with it
    /// unless a queued placement still needs them.
    fn remove_resting_order(&mut self, order_id: &OrderId) -> Result<Order, ClobError> {
        let order = self.market_mut(order_id.clob_pair_id)?.book.remove(order_id)?;
        if order.is_short_term() && !self.ledger.is_order_placement_queued(&order) {
            self.ledger.remove_tx_bytes(&order);
        }
        Ok(order)
    }

    fn remove_if_resting(&mut self, order_id: &OrderId) -> Result<Option<Order>, ClobError> {
        let resting = self
            .markets
            .get(&order_id.clob_pair_id)
            .is_some_and(|market| market.book.contains(order_id));
        if !resting {
            return Ok(None);
        }
        self.remove_resting_order(order_id).map(Some)
    }

    fn ensure_not_crossed(&self, clob_pair_id: ClobPairId) -> Result<(), ClobError> {
        let (best_bid, best_ask) = self.market(clob_pair_id)?.book.best_prices();
        if let (Some(best_bid), Some(best_ask)) = (best_bid, best_ask) {
            if is_crossed(Some(best_bid), Some(best_ask)) {
                error!(
                    clob_pair_id = %clob_pair_id,
                    best_bid = best_bid.value(),
                    best_ask = best_ask.value(),
                    "Orderbook is crossed"
                );
                return Err(InvariantViolation::CrossedBook {
                    clob_pair_id,
                    best_bid,
                    best_ask,
                }
                .into());
            }
        }
        Ok(())
    }
}
