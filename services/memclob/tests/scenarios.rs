//! End-to-end scenarios for the in-memory order book
//!
//! Every test drives the public `MemClob` surface against the in-memory
//! keeper and checks book state, the operations queue and off-chain messages.

use memclob::keeper::PositionQuery;
use memclob::testutil::InMemoryKeeper;
use memclob::{
    MemClob, MemClobConfig, OffchainMessage, PlaceOrderOutcome, RemovalStatus, ReplayPostOnlyPolicy, RiskLimit,
};
use std::collections::HashMap;
use types::clob_pair::ClobPair;
use types::errors::{CancelError, ClobError, MatchingRejection, ValidationError};
use types::ids::{ClobPairId, OrderId, SubaccountId, ORDER_FLAGS_LONG_TERM};
use types::liquidation::LiquidationOrder;
use types::numeric::{BaseQuantums, Subticks};
use types::operations::{
    ClobMatch, DeleveragingFill, InternalOperation, MakerFill, MatchOrders, MatchPerpetualDeleveraging,
    OrderRemoval, ProposedOperation,
};
use types::order::{GoodTil, Order, OrderStatus, RemovalReason, Side, TimeInForce};

const MARKET: ClobPairId = ClobPairId(0);

fn new_memclob(config: MemClobConfig) -> MemClob<InMemoryKeeper> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut memclob = MemClob::new(config);
    memclob
        .create_market(ClobPair::new(MARKET, 0, 1, BaseQuantums(1), BaseQuantums(1)))
        .unwrap();
    memclob.set_keeper(InMemoryKeeper::new());
    memclob
}

fn setup() -> MemClob<InMemoryKeeper> {
    new_memclob(MemClobConfig::default())
}

fn subaccount(owner: &str) -> SubaccountId {
    SubaccountId::new(owner, 0)
}

fn short_term(owner: &str, client_id: u32, side: Side, quantums: u64, subticks: u64) -> Order {
    Order::new(
        OrderId::new(subaccount(owner), client_id, 0, MARKET),
        side,
        BaseQuantums(quantums),
        Subticks(subticks),
        GoodTil::Block(20),
        TimeInForce::GTC,
    )
}

fn long_term(owner: &str, client_id: u32, side: Side, quantums: u64, subticks: u64) -> Order {
    Order::new(
        OrderId::new(subaccount(owner), client_id, ORDER_FLAGS_LONG_TERM, MARKET),
        side,
        BaseQuantums(quantums),
        Subticks(subticks),
        GoodTil::BlockTime(1_000),
        TimeInForce::GTC,
    )
}

fn with_tif(mut order: Order, time_in_force: TimeInForce) -> Order {
    order.time_in_force = time_in_force;
    order
}

fn with_good_til_block(mut order: Order, good_til_block: u32) -> Order {
    order.good_til = GoodTil::Block(good_til_block);
    order
}

fn tx_bytes(order: &Order) -> Vec<u8> {
    format!("tx:{}:{}", order.order_id, order.replacement_key()).into_bytes()
}

fn place(memclob: &mut MemClob<InMemoryKeeper>, order: &Order) -> Result<PlaceOrderOutcome, ClobError> {
    memclob.place_order(order.clone(), tx_bytes(order))
}

fn keeper(memclob: &mut MemClob<InMemoryKeeper>) -> &mut InMemoryKeeper {
    memclob.keeper_mut().unwrap()
}

fn removals(messages: &[OffchainMessage]) -> Vec<(OrderId, RemovalReason, RemovalStatus)> {
    messages
        .iter()
        .filter_map(|message| match message {
            OffchainMessage::Remove {
                order_id,
                reason,
                status,
            } => Some((order_id.clone(), *reason, *status)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_gtc_buy_rests_on_empty_book() {
    let mut memclob = setup();
    let bid = short_term("alice", 1, Side::BUY, 10, 100);

    let placed = place(&mut memclob, &bid).unwrap();
    assert_eq!(placed.status, OrderStatus::Success);
    assert!(placed.resting);
    assert!(placed.fills.is_empty());

    assert_eq!(memclob.best_prices(MARKET).unwrap(), (Some(Subticks(100)), None));
    let book = memclob.orderbook(MARKET).unwrap();
    let level = book.side(Side::BUY).unwrap().level(Subticks(100)).unwrap();
    assert_eq!(level.order_count(), 1);
    assert_eq!(memclob.get_order(&bid.order_id).unwrap().quantums, BaseQuantums(10));
    // Resting without a match queues nothing
    assert!(memclob.ledger().is_empty());
}

#[test]
fn test_ioc_sell_partially_fills_resting_bid() {
    let mut memclob = setup();
    let bid = short_term("alice", 1, Side::BUY, 10, 100);
    let ioc = with_tif(short_term("bob", 1, Side::SELL, 4, 100), TimeInForce::IOC);
    place(&mut memclob, &bid).unwrap();

    let placed = place(&mut memclob, &ioc).unwrap();
    assert_eq!(placed.status, OrderStatus::Success);
    assert_eq!(placed.filled, BaseQuantums(4));
    assert_eq!(
        placed.fills,
        vec![MakerFill {
            maker_order_id: bid.order_id.clone(),
            fill_amount: BaseQuantums(4),
        }]
    );
    assert!(!placed.resting);

    assert_eq!(
        memclob.get_order_remaining_amount(&bid).unwrap(),
        Some(BaseQuantums(6))
    );
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (Some(Subticks(100)), None));

    assert_eq!(
        memclob.ledger().operations(),
        &[
            InternalOperation::ShortTermOrderPlacement(bid.clone()),
            InternalOperation::ShortTermOrderPlacement(ioc.clone()),
            InternalOperation::Match(ClobMatch::Orders(MatchOrders {
                taker_order_id: ioc.order_id.clone(),
                fills: placed.fills.clone(),
            })),
        ]
    );
    let proposed = memclob.get_operations_to_propose().unwrap();
    assert_eq!(proposed[0], ProposedOperation::ShortTermOrderPlacement(tx_bytes(&bid)));
    assert_eq!(proposed[1], ProposedOperation::ShortTermOrderPlacement(tx_bytes(&ioc)));
}

#[test]
fn test_self_trade_evicts_resting_order() {
    let mut memclob = setup();
    let bid = short_term("alice", 1, Side::BUY, 10, 100);
    let ask = short_term("alice", 2, Side::SELL, 10, 100);
    place(&mut memclob, &bid).unwrap();
    memclob.take_offchain_updates();

    let placed = place(&mut memclob, &ask).unwrap();
    assert!(placed.fills.is_empty());
    assert!(placed.resting);
    assert!(memclob.get_order(&bid.order_id).is_none());
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, Some(Subticks(100))));
    assert!(memclob.ledger().is_empty());

    let removed = removals(&memclob.take_offchain_updates());
    assert_eq!(
        removed,
        vec![(
            bid.order_id.clone(),
            RemovalReason::InvalidSelfTrade,
            RemovalStatus::BestEffortCanceled
        )]
    );
}

#[test]
fn test_fill_or_kill_leaves_book_and_ledger_unchanged() {
    let mut memclob = setup();
    let bid = short_term("alice", 1, Side::BUY, 10, 100);
    let ask = short_term("bob", 1, Side::SELL, 10, 101);
    place(&mut memclob, &bid).unwrap();
    place(&mut memclob, &ask).unwrap();
    let snapshot_before = memclob.depth_snapshot(MARKET, 10).unwrap();

    let fok = with_tif(short_term("carol", 1, Side::BUY, 20, 101), TimeInForce::FOK);
    let err = place(&mut memclob, &fok).unwrap_err();
    assert_eq!(
        err,
        ClobError::Matching(MatchingRejection::FillOrKillNotFilled {
            order_id: fok.order_id.clone(),
            remaining: BaseQuantums(10),
        })
    );

    assert_eq!(memclob.depth_snapshot(MARKET, 10).unwrap(), snapshot_before);
    assert_eq!(memclob.get_order_filled_amount(&ask.order_id).unwrap(), BaseQuantums(0));
    assert!(memclob.ledger().is_empty());
    assert_eq!(keeper(&mut memclob).branch_depth(), 0);
    assert_eq!(keeper(&mut memclob).discards(), 1);
}

#[test]
fn test_reduce_only_taker_is_capped_by_position() {
    let mut memclob = setup();
    keeper(&mut memclob).set_position(&subaccount("alice"), MARKET, 3);
    place(&mut memclob, &short_term("bob", 1, Side::BUY, 2, 100)).unwrap();
    place(&mut memclob, &short_term("carol", 1, Side::BUY, 2, 100)).unwrap();
    let dave_bid = short_term("dave", 1, Side::BUY, 2, 99);
    place(&mut memclob, &dave_bid).unwrap();

    let sell = short_term("alice", 1, Side::SELL, 5, 99).with_reduce_only(true);
    let placed = place(&mut memclob, &sell).unwrap();

    assert_eq!(placed.status, OrderStatus::ReduceOnlyResized);
    assert_eq!(placed.filled, BaseQuantums(3));
    assert_eq!(
        placed.fills.iter().map(|fill| fill.fill_amount).collect::<Vec<_>>(),
        vec![BaseQuantums(2), BaseQuantums(1)]
    );
    assert!(!placed.resting);
    assert_eq!(keeper(&mut memclob).position_size(&subaccount("alice"), MARKET), 0);
    assert!(memclob.get_order(&dave_bid.order_id).is_some());
}

#[test]
fn test_reduce_only_order_that_would_increase_position_is_rejected() {
    let mut memclob = setup();
    keeper(&mut memclob).set_position(&subaccount("alice"), MARKET, 3);
    let buy = short_term("alice", 1, Side::BUY, 5, 100).with_reduce_only(true);
    assert_eq!(
        place(&mut memclob, &buy),
        Err(ClobError::Validation(ValidationError::ReduceOnlyWouldIncreasePosition))
    );
}

#[test]
fn test_same_price_makers_fill_in_arrival_order() {
    let mut memclob = setup();
    let first = short_term("bob", 1, Side::SELL, 5, 100);
    let second = short_term("carol", 1, Side::SELL, 5, 100);
    place(&mut memclob, &first).unwrap();
    place(&mut memclob, &second).unwrap();

    let taker = with_tif(short_term("alice", 1, Side::BUY, 5, 100), TimeInForce::IOC);
    let placed = place(&mut memclob, &taker).unwrap();
    assert_eq!(placed.fills[0].maker_order_id, first.order_id);
    assert!(memclob.get_order(&first.order_id).is_none());
    assert!(memclob.get_order(&second.order_id).is_some());
}

#[test]
fn test_lower_ask_fills_before_higher_ask() {
    let mut memclob = setup();
    let expensive = short_term("bob", 1, Side::SELL, 5, 102);
    let cheap = short_term("carol", 1, Side::SELL, 5, 101);
    place(&mut memclob, &expensive).unwrap();
    place(&mut memclob, &cheap).unwrap();

    let placed = place(&mut memclob, &short_term("alice", 1, Side::BUY, 5, 102)).unwrap();
    assert_eq!(placed.fills[0].maker_order_id, cheap.order_id);
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, Some(Subticks(102))));
}

#[test]
fn test_replacement_moves_order_to_tail() {
    let mut memclob = setup();
    let bob_bid = with_good_til_block(short_term("bob", 1, Side::BUY, 5, 100), 10);
    let carol_bid = short_term("carol", 1, Side::BUY, 5, 100);
    place(&mut memclob, &bob_bid).unwrap();
    place(&mut memclob, &carol_bid).unwrap();

    let replacement = with_good_til_block(bob_bid.clone(), 11);
    place(&mut memclob, &replacement).unwrap();
    assert_eq!(memclob.get_order(&bob_bid.order_id), Some(&replacement));

    let placed = place(&mut memclob, &short_term("dave", 1, Side::SELL, 5, 100)).unwrap();
    assert_eq!(placed.fills[0].maker_order_id, carol_bid.order_id);

    let messages = memclob.take_offchain_updates();
    assert!(removals(&messages).contains(&(
        bob_bid.order_id.clone(),
        RemovalReason::Replaced,
        RemovalStatus::BestEffortCanceled
    )));
}

#[test]
fn test_replacement_with_equal_key_is_rejected() {
    let mut memclob = setup();
    let bid = with_good_til_block(short_term("bob", 1, Side::BUY, 5, 100), 10);
    place(&mut memclob, &bid).unwrap();

    let mut repriced = bid.clone();
    repriced.subticks = Subticks(101);
    let err = place(&mut memclob, &repriced).unwrap_err();
    assert!(matches!(
        err,
        ClobError::Validation(ValidationError::InvalidReplacement { .. })
    ));
    assert_eq!(memclob.get_order(&bid.order_id), Some(&bid));
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (Some(Subticks(100)), None));
}

#[test]
fn test_replacement_crossing_the_book_matches_others_only() {
    let mut memclob = setup();
    let bid = with_good_til_block(short_term("alice", 1, Side::BUY, 5, 99), 10);
    let ask = short_term("bob", 1, Side::SELL, 5, 100);
    place(&mut memclob, &bid).unwrap();
    place(&mut memclob, &ask).unwrap();

    let mut repriced = with_good_til_block(bid.clone(), 11);
    repriced.subticks = Subticks(100);
    let placed = place(&mut memclob, &repriced).unwrap();
    assert_eq!(placed.filled, BaseQuantums(5));
    assert!(!placed.resting);
    assert!(memclob.get_order(&bid.order_id).is_none());
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, None));
}

#[test]
fn test_cancel_is_upgrade_only() {
    let mut memclob = setup();
    let bid = with_good_til_block(short_term("alice", 1, Side::BUY, 5, 100), 10);
    place(&mut memclob, &bid).unwrap();

    memclob.cancel_order(&bid.order_id, 5).unwrap();
    assert!(memclob.get_order(&bid.order_id).is_some());
    assert_eq!(memclob.get_cancel(&bid.order_id), Some(5));

    assert_eq!(
        memclob.cancel_order(&bid.order_id, 5),
        Err(ClobError::Cancel(CancelError::AlreadyExists {
            order_id: bid.order_id.clone(),
            existing_til_block: 5,
            til_block: 5,
        }))
    );

    memclob.take_offchain_updates();
    memclob.cancel_order(&bid.order_id, 12).unwrap();
    assert!(memclob.get_order(&bid.order_id).is_none());
    assert_eq!(
        removals(&memclob.take_offchain_updates()),
        vec![(
            bid.order_id.clone(),
            RemovalReason::UserCanceled,
            RemovalStatus::BestEffortCanceled
        )]
    );

    let again = with_good_til_block(bid.clone(), 11);
    assert_eq!(
        place(&mut memclob, &again),
        Err(ClobError::Validation(ValidationError::OrderIsCanceled {
            order_id: bid.order_id.clone(),
            cancel_til_block: 12,
        }))
    );
    let later = with_good_til_block(bid.clone(), 13);
    assert!(place(&mut memclob, &later).unwrap().resting);
}

#[test]
fn test_cancel_without_resting_order_is_reported() {
    let mut memclob = setup();
    let order_id = short_term("alice", 1, Side::BUY, 5, 100).order_id;
    memclob.cancel_order(&order_id, 10).unwrap();
    assert_eq!(
        removals(&memclob.take_offchain_updates()),
        vec![(order_id, RemovalReason::UserCanceled, RemovalStatus::BestEffortCanceled)]
    );
}

#[test]
fn test_cancel_rejects_stateful_orders() {
    let mut memclob = setup();
    let order = long_term("alice", 1, Side::BUY, 5, 100);
    assert_eq!(
        memclob.cancel_order(&order.order_id, 10),
        Err(ClobError::Cancel(CancelError::NotShortTerm {
            order_id: order.order_id.clone()
        }))
    );
}

#[test]
fn test_post_only_crossing_is_rejected_without_mutation() {
    let mut memclob = setup();
    let ask = short_term("bob", 1, Side::SELL, 5, 100);
    place(&mut memclob, &ask).unwrap();

    let post_only = with_tif(long_term("alice", 1, Side::BUY, 5, 100), TimeInForce::POST_ONLY);
    assert_eq!(
        place(&mut memclob, &post_only),
        Err(ClobError::Matching(MatchingRejection::PostOnlyWouldCrossMakerOrder {
            order_id: post_only.order_id.clone()
        }))
    );
    assert_eq!(memclob.get_order_filled_amount(&ask.order_id).unwrap(), BaseQuantums(0));
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, Some(Subticks(100))));
    assert_eq!(
        memclob.ledger().operations(),
        &[InternalOperation::OrderRemoval(OrderRemoval {
            order_id: post_only.order_id.clone(),
            reason: RemovalReason::PostOnlyWouldCrossMakerOrder,
        })]
    );
}

#[test]
fn test_rejected_post_only_replacement_keeps_resting_version() {
    let mut memclob = setup();
    let resting = with_tif(long_term("alice", 1, Side::BUY, 5, 99), TimeInForce::POST_ONLY);
    place(&mut memclob, &resting).unwrap();
    place(&mut memclob, &short_term("bob", 1, Side::SELL, 5, 100)).unwrap();
    memclob.take_offchain_updates();

    let mut replacement = resting.clone();
    replacement.subticks = Subticks(100);
    replacement.good_til = GoodTil::BlockTime(2_000);
    assert_eq!(
        place(&mut memclob, &replacement),
        Err(ClobError::Matching(MatchingRejection::PostOnlyWouldCrossMakerOrder {
            order_id: resting.order_id.clone()
        }))
    );

    assert_eq!(memclob.get_order(&resting.order_id), Some(&resting));
    assert!(memclob.ledger().is_empty());
    assert!(memclob.take_offchain_updates().is_empty());
}

#[test]
fn test_stateful_fill_or_kill_leaves_ledger_unchanged() {
    let mut memclob = setup();
    place(&mut memclob, &short_term("bob", 1, Side::SELL, 5, 100)).unwrap();
    let snapshot_before = memclob.depth_snapshot(MARKET, 10).unwrap();
    memclob.take_offchain_updates();

    let fok = with_tif(long_term("alice", 1, Side::BUY, 10, 100), TimeInForce::FOK);
    assert_eq!(
        place(&mut memclob, &fok),
        Err(ClobError::Matching(MatchingRejection::FillOrKillNotFilled {
            order_id: fok.order_id.clone(),
            remaining: BaseQuantums(5),
        }))
    );

    assert_eq!(memclob.depth_snapshot(MARKET, 10).unwrap(), snapshot_before);
    assert!(memclob.ledger().is_empty());
    assert_eq!(
        removals(&memclob.take_offchain_updates()),
        vec![(
            fok.order_id.clone(),
            RemovalReason::FokUnfilled,
            RemovalStatus::BestEffortCanceled
        )]
    );
}

#[test]
fn test_clear_drops_bytes_of_filled_replacement() {
    let mut memclob = setup();
    place(&mut memclob, &short_term("carol", 1, Side::SELL, 6, 101)).unwrap();
    place(&mut memclob, &short_term("bob", 1, Side::SELL, 4, 100)).unwrap();

    let first = short_term("alice", 1, Side::BUY, 10, 100);
    assert!(place(&mut memclob, &first).unwrap().resting);

    let mut second = with_good_til_block(first.clone(), 21);
    second.subticks = Subticks(101);
    let placed = place(&mut memclob, &second).unwrap();
    assert_eq!(placed.filled, BaseQuantums(6));
    assert!(!placed.resting);
    assert!(memclob.ledger().tx_bytes(&second.hash()).is_none());

    let (operations, _) = memclob.get_operations_to_replay();
    memclob.remove_and_clear_operations_queue(&operations).unwrap();
    assert!(memclob.ledger().is_empty());
    assert!(memclob.ledger().tx_bytes(&first.hash()).is_none());
    assert!(memclob.ledger().tx_bytes(&second.hash()).is_none());
}

#[test]
fn test_undercollateralized_taker_keeps_prior_fills() {
    let mut memclob = setup();
    let cheap = short_term("bob", 1, Side::SELL, 5, 100);
    let expensive = short_term("bob", 2, Side::SELL, 5, 101);
    place(&mut memclob, &cheap).unwrap();
    place(&mut memclob, &expensive).unwrap();
    keeper(&mut memclob).fail_taker_after_fills(subaccount("carol"), 1);

    let placed = place(&mut memclob, &short_term("carol", 1, Side::BUY, 10, 101)).unwrap();
    assert_eq!(placed.status, OrderStatus::Undercollateralized);
    assert_eq!(placed.filled, BaseQuantums(5));
    assert!(!placed.resting);
    assert!(memclob.get_order(&expensive.order_id).is_some());
    assert_eq!(keeper(&mut memclob).commits(), 3);
}

#[test]
fn test_undercollateralized_maker_is_evicted() {
    let mut memclob = setup();
    let ask = long_term("bob", 1, Side::SELL, 5, 100);
    place(&mut memclob, &ask).unwrap();
    keeper(&mut memclob).mark_undercollateralized(subaccount("bob"));
    memclob.take_offchain_updates();

    let bid = short_term("carol", 1, Side::BUY, 5, 100);
    let placed = place(&mut memclob, &bid).unwrap();
    assert!(placed.fills.is_empty());
    assert!(placed.resting);
    assert!(memclob.get_order(&ask.order_id).is_none());
    assert_eq!(
        memclob.ledger().operations(),
        &[InternalOperation::OrderRemoval(OrderRemoval {
            order_id: ask.order_id.clone(),
            reason: RemovalReason::Undercollateralized,
        })]
    );
    assert_eq!(
        removals(&memclob.take_offchain_updates()),
        vec![(
            ask.order_id.clone(),
            RemovalReason::Undercollateralized,
            RemovalStatus::BestEffortCanceled
        )]
    );
}

#[test]
fn test_add_to_book_failure_drops_remainder() {
    let mut memclob = setup();
    let bid = short_term("alice", 1, Side::BUY, 5, 100);
    keeper(&mut memclob).fail_add_to_book(bid.order_id.clone());

    let placed = place(&mut memclob, &bid).unwrap();
    assert_eq!(placed.status, OrderStatus::Undercollateralized);
    assert!(!placed.resting);
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, None));
}

#[test]
fn test_sign_flip_cancels_reduce_only_orders() {
    let mut memclob = setup();
    keeper(&mut memclob).set_position(&subaccount("alice"), MARKET, 5);
    let reduce_only = short_term("alice", 1, Side::SELL, 5, 110).with_reduce_only(true);
    place(&mut memclob, &reduce_only).unwrap();
    place(&mut memclob, &short_term("bob", 1, Side::BUY, 10, 100)).unwrap();
    memclob.take_offchain_updates();

    let placed = place(&mut memclob, &short_term("alice", 2, Side::SELL, 10, 100)).unwrap();
    assert_eq!(placed.filled, BaseQuantums(10));
    assert_eq!(keeper(&mut memclob).position_size(&subaccount("alice"), MARKET), -5);
    assert!(memclob.get_order(&reduce_only.order_id).is_none());
    assert!(removals(&memclob.take_offchain_updates()).contains(&(
        reduce_only.order_id.clone(),
        RemovalReason::InvalidReduceOnly,
        RemovalStatus::BestEffortCanceled
    )));
}

#[test]
fn test_stateful_maker_is_referenced_not_placed() {
    let mut memclob = setup();
    let ask = long_term("dave", 1, Side::SELL, 5, 100);
    place(&mut memclob, &ask).unwrap();

    let ioc = with_tif(short_term("carol", 1, Side::BUY, 5, 100), TimeInForce::IOC);
    place(&mut memclob, &ioc).unwrap();
    assert_eq!(
        memclob.ledger().operations()[0],
        InternalOperation::PreexistingStatefulOrder(ask.order_id.clone())
    );

    let proposed = memclob.get_operations_to_propose().unwrap();
    assert_eq!(proposed.len(), 2);
    assert_eq!(proposed[0], ProposedOperation::ShortTermOrderPlacement(tx_bytes(&ioc)));
}

#[test]
fn test_liquidation_matches_without_price_limit() {
    let mut memclob = setup();
    let liquidated = subaccount("liq");
    keeper(&mut memclob).set_position(&liquidated, MARKET, 10);
    place(&mut memclob, &short_term("bob", 1, Side::BUY, 4, 100)).unwrap();
    place(&mut memclob, &short_term("carol", 1, Side::BUY, 10, 90)).unwrap();

    let liquidation = LiquidationOrder::new(liquidated.clone(), MARKET, 0, Side::SELL, BaseQuantums(10));
    let outcome = memclob.place_liquidation(liquidation).unwrap();
    assert_eq!(outcome.status, OrderStatus::Success);
    assert_eq!(outcome.filled, BaseQuantums(10));
    assert_eq!(outcome.quantums_deleveraged, 0);
    assert_eq!(keeper(&mut memclob).position_size(&liquidated, MARKET), 0);

    match memclob.ledger().operations().last() {
        Some(InternalOperation::Match(ClobMatch::PerpetualLiquidation(liquidation_match))) => {
            assert_eq!(liquidation_match.total_size, BaseQuantums(10));
            assert_eq!(liquidation_match.fills.len(), 2);
        }
        other => panic!("unexpected last operation: {other:?}"),
    }
}

#[test]
fn test_liquidation_falls_back_to_deleveraging() {
    let mut memclob = setup();
    let liquidated = subaccount("liq");
    let counterparty = subaccount("cp");
    keeper(&mut memclob).set_position(&liquidated, MARKET, 10);
    keeper(&mut memclob).set_position(&counterparty, MARKET, -10);
    keeper(&mut memclob).allow_deleveraging(liquidated.clone(), counterparty.clone());
    keeper(&mut memclob).set_risk_limit(Some(RiskLimit::InsuranceFundInsufficient));
    place(&mut memclob, &short_term("bob", 1, Side::BUY, 10, 100)).unwrap();

    let liquidation = LiquidationOrder::new(liquidated.clone(), MARKET, 0, Side::SELL, BaseQuantums(10));
    let outcome = memclob.place_liquidation(liquidation).unwrap();
    assert_eq!(outcome.status, OrderStatus::LiquidationRequiresDeleveraging);
    assert!(outcome.filled.is_zero());
    assert_eq!(outcome.quantums_deleveraged, 10);

    assert_eq!(
        memclob.ledger().operations(),
        &[InternalOperation::Deleveraging(MatchPerpetualDeleveraging {
            liquidated: liquidated.clone(),
            perpetual_id: 0,
            fills: vec![DeleveragingFill {
                offsetting_subaccount_id: counterparty,
                fill_amount: BaseQuantums(10),
            }],
            is_final_settlement: false,
        })]
    );
    assert_eq!(keeper(&mut memclob).position_size(&liquidated, MARKET), 0);
}

#[test]
fn test_zero_fill_deleveraging_is_recorded() {
    let mut memclob = setup();
    memclob.insert_zero_fill_deleveraging(&subaccount("liq"), 0);
    assert_eq!(
        memclob.ledger().operations(),
        &[InternalOperation::Deleveraging(MatchPerpetualDeleveraging {
            liquidated: subaccount("liq"),
            perpetual_id: 0,
            fills: Vec::new(),
            is_final_settlement: false,
        })]
    );
}

#[test]
fn test_clear_and_replay_rebuilds_queue() {
    let mut memclob = setup();
    let ask = short_term("bob", 1, Side::SELL, 10, 100);
    let bid = short_term("carol", 1, Side::BUY, 4, 100);
    place(&mut memclob, &ask).unwrap();
    place(&mut memclob, &bid).unwrap();

    let (operations, bytes) = memclob.get_operations_to_replay();
    assert_eq!(operations.len(), 3);
    assert_eq!(bytes.len(), 2);

    memclob.remove_and_clear_operations_queue(&operations).unwrap();
    assert!(memclob.ledger().is_empty());
    assert!(memclob.get_order(&ask.order_id).is_none());
    assert!(memclob.ledger().tx_bytes(&ask.hash()).is_none());

    // The committed block did not include the local matches
    memclob.set_keeper(InMemoryKeeper::new());
    let stats = memclob.replay_operations(&operations, &bytes);
    assert_eq!(stats.placed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(memclob.ledger().operations(), operations.as_slice());
    assert_eq!(
        memclob.get_order_remaining_amount(&ask).unwrap(),
        Some(BaseQuantums(6))
    );
}

#[test]
fn test_replay_skips_placements_without_tx_bytes() {
    let mut memclob = setup();
    let bid = short_term("carol", 1, Side::BUY, 4, 100);
    let operations = vec![InternalOperation::ShortTermOrderPlacement(bid.clone())];

    let stats = memclob.replay_operations(&operations, &HashMap::new());
    assert_eq!(stats.skipped, 1);
    assert!(memclob.get_order(&bid.order_id).is_none());
}

fn post_only_replay_fixture() -> (Vec<InternalOperation>, HashMap<types::order::OrderHash, Vec<u8>>) {
    let taker = with_tif(short_term("carol", 1, Side::BUY, 5, 100), TimeInForce::IOC);
    let maker = with_tif(short_term("bob", 1, Side::SELL, 5, 100), TimeInForce::POST_ONLY);
    let bytes = [&taker, &maker]
        .into_iter()
        .map(|order| (order.hash(), tx_bytes(order)))
        .collect();
    (
        vec![
            InternalOperation::ShortTermOrderPlacement(taker),
            InternalOperation::ShortTermOrderPlacement(maker),
        ],
        bytes,
    )
}

#[test]
fn test_replay_places_post_only_orders_first() {
    let mut memclob = setup();
    let (operations, bytes) = post_only_replay_fixture();

    memclob.replay_operations(&operations, &bytes);
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, None));
    assert!(matches!(
        memclob.ledger().operations().last(),
        Some(InternalOperation::Match(_))
    ));
}

#[test]
fn test_replay_in_queue_order() {
    let mut memclob = new_memclob(MemClobConfig::default().with_replay_post_only(ReplayPostOnlyPolicy::InOrder));
    let (operations, bytes) = post_only_replay_fixture();

    let stats = memclob.replay_operations(&operations, &bytes);
    assert_eq!(stats.placed, 2);
    assert_eq!(memclob.best_prices(MARKET).unwrap(), (None, Some(Subticks(100))));
    assert!(memclob.ledger().is_empty());
}

#[test]
fn test_replay_re_places_removed_stateful_order_still_in_state() {
    let mut memclob = setup();
    let order = long_term("dave", 1, Side::BUY, 5, 100);
    keeper(&mut memclob).store_long_term_order(order.clone());
    let gone = long_term("erin", 1, Side::BUY, 5, 99);

    let operations = vec![
        InternalOperation::OrderRemoval(OrderRemoval {
            order_id: order.order_id.clone(),
            reason: RemovalReason::Undercollateralized,
        }),
        InternalOperation::OrderRemoval(OrderRemoval {
            order_id: gone.order_id.clone(),
            reason: RemovalReason::Undercollateralized,
        }),
        InternalOperation::PreexistingStatefulOrder(order.order_id.clone()),
    ];
    let stats = memclob.replay_operations(&operations, &HashMap::new());
    assert_eq!(stats.placed, 1);
    assert!(memclob.get_order(&order.order_id).is_some());
    assert!(memclob.get_order(&gone.order_id).is_none());
}

#[test]
fn test_purge_invalid_state() {
    let mut memclob = setup();
    let expiring = with_good_til_block(short_term("bob", 1, Side::BUY, 5, 100), 5);
    let live = with_good_til_block(short_term("carol", 1, Side::BUY, 5, 99), 8);
    let filled = with_good_til_block(short_term("erin", 1, Side::BUY, 5, 98), 8);
    let stateful = long_term("dave", 1, Side::BUY, 5, 97);
    for order in [&expiring, &live, &filled, &stateful] {
        place(&mut memclob, order).unwrap();
    }
    let canceled = short_term("frank", 1, Side::SELL, 5, 120);
    memclob.cancel_order(&canceled.order_id, 5).unwrap();
    keeper(&mut memclob).set_filled(&filled.order_id, BaseQuantums(5));
    memclob.take_offchain_updates();

    // Short-term ids in the expired list are ignored
    let expired_stateful = vec![stateful.order_id.clone(), stateful.order_id.clone(), live.order_id.clone()];
    memclob
        .purge_invalid_state(&[filled.order_id.clone()], &expired_stateful, &[], &[], 5)
        .unwrap();

    assert!(memclob.get_order(&expiring.order_id).is_none());
    assert!(memclob.get_order(&stateful.order_id).is_none());
    assert!(memclob.get_order(&filled.order_id).is_none());
    assert!(memclob.get_order(&live.order_id).is_some());
    assert_eq!(memclob.get_cancel(&canceled.order_id), None);

    let removed = removals(&memclob.take_offchain_updates());
    assert_eq!(removed.len(), 2);
    assert!(removed
        .iter()
        .all(|(_, reason, status)| *reason == RemovalReason::Expired && *status == RemovalStatus::Canceled));

    // Absent ids are ignored
    memclob
        .purge_invalid_state(
            &[filled.order_id.clone()],
            &expired_stateful,
            &[stateful.order_id.clone()],
            &[stateful.order_id.clone()],
            5,
        )
        .unwrap();
}

#[test]
fn test_offchain_updates_can_be_disabled() {
    let mut memclob = new_memclob(MemClobConfig::default().with_offchain_updates(false));
    place(&mut memclob, &short_term("bob", 1, Side::SELL, 5, 100)).unwrap();
    place(&mut memclob, &short_term("carol", 1, Side::BUY, 5, 100)).unwrap();
    assert!(memclob.take_offchain_updates().is_empty());
}

#[test]
fn test_offchain_updates_report_fills() {
    let mut memclob = setup();
    let ask = short_term("bob", 1, Side::SELL, 10, 100);
    let bid = short_term("carol", 1, Side::BUY, 4, 100);
    place(&mut memclob, &ask).unwrap();
    place(&mut memclob, &bid).unwrap();

    let messages = memclob.take_offchain_updates();
    assert!(matches!(messages[0], OffchainMessage::Place { .. }));
    assert!(messages.contains(&OffchainMessage::Update {
        order_id: ask.order_id.clone(),
        total_filled: BaseQuantums(4),
    }));
    assert!(messages.contains(&OffchainMessage::Update {
        order_id: bid.order_id.clone(),
        total_filled: BaseQuantums(4),
    }));
}

#[test]
fn test_unknown_market_and_invalid_side() {
    let mut memclob = setup();
    let mut order = short_term("alice", 1, Side::BUY, 5, 100);
    order.order_id.clob_pair_id = ClobPairId(7);
    assert_eq!(
        place(&mut memclob, &order),
        Err(ClobError::MarketNotFound {
            clob_pair_id: ClobPairId(7)
        })
    );

    let mut order = short_term("alice", 1, Side::BUY, 5, 100);
    order.side = Side::UNSPECIFIED;
    assert_eq!(
        place(&mut memclob, &order),
        Err(ClobError::Validation(ValidationError::InvalidSide))
    );
}

#[test]
fn test_equity_tier_applies_to_new_orders_only() {
    let mut memclob = setup();
    let bid = with_good_til_block(short_term("alice", 1, Side::BUY, 5, 100), 10);
    place(&mut memclob, &bid).unwrap();
    keeper(&mut memclob).reject_equity_tier(subaccount("alice"));

    assert!(place(&mut memclob, &with_good_til_block(bid.clone(), 11)).is_ok());
    assert!(matches!(
        place(&mut memclob, &short_term("alice", 2, Side::BUY, 5, 100)),
        Err(ClobError::Validation(ValidationError::EquityTierExceeded { .. }))
    ));
}

#[test]
fn test_orders_off_the_market_grid_are_rejected() {
    let mut memclob = setup();
    let coarse = ClobPairId(1);
    memclob
        .create_market(ClobPair::new(coarse, 1, 10, BaseQuantums(5), BaseQuantums(5)))
        .unwrap();

    let mut order = short_term("alice", 1, Side::BUY, 10, 105);
    order.order_id.clob_pair_id = coarse;
    assert!(matches!(
        place(&mut memclob, &order),
        Err(ClobError::Validation(ValidationError::OffGrid { .. }))
    ));

    order.subticks = Subticks(110);
    order.quantums = BaseQuantums(7);
    assert!(matches!(
        place(&mut memclob, &order),
        Err(ClobError::Validation(ValidationError::OffGrid { .. }))
    ));

    order.quantums = BaseQuantums(10);
    assert!(place(&mut memclob, &order).unwrap().resting);
}
