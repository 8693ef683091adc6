//! End-to-end coordinator scenarios straight from the spec's worked examples
//! (S1-S6) plus the cross-cutting invariants (conservation of cash/shares, no
//! crossed book). Exercises the full submit -> match -> settle -> notify path
//! through `SubmissionCoordinator`, the same entry point the wire frontend
//! uses, without going through a socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use order_book_engine::coordinator::{AuditSink, NotificationSink, SubmissionCoordinator};
use order_book_engine::order::{Order, OrderSide, OrderStatus, OrderType};
use order_book_engine::registry::Registry;
use order_book_engine::trade::Trade;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::tempdir;

struct NullAudit;
impl AuditSink for NullAudit {
    fn record_order(&self, _order: &Order) {}
    fn record_trade(&self, _trade: &Trade) {}
}

/// Collects every pushed line per trader so assertions can check exact wire
/// text without standing up a real socket.
#[derive(Default)]
struct RecordingNotifications {
    lines: Mutex<HashMap<String, Vec<String>>>,
}

impl RecordingNotifications {
    fn lines_for(&self, trader_id: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .get(trader_id)
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, trader_id: &str, line: String) {
        self.lines
            .lock()
            .unwrap()
            .entry(trader_id.to_string())
            .or_default()
            .push(line);
    }
}

impl NotificationSink for RecordingNotifications {
    fn notify_trade(&self, trader_id: &str, trade: &Trade, side: OrderSide) {
        self.push(
            trader_id,
            format!(
                "TRADE_EXECUTED:{}:{}:{}:{}@{}",
                trade.trade_id,
                trade.symbol,
                side.as_str(),
                trade.quantity,
                trade.price
            ),
        );
    }

    fn notify_settlement(
        &self,
        trader_id: &str,
        symbol: &str,
        signed_quantity: Decimal,
        price: Decimal,
    ) {
        self.push(trader_id, format!("SETTLEMENT:{symbol}:{signed_quantity}@{price}"));
    }

    fn notify_order_cancelled(&self, trader_id: &str, order_id: u64, reason: &str) {
        self.push(trader_id, format!("ORDER_CANCELLED:{order_id}:{reason}"));
    }
}

struct Harness {
    coordinator: SubmissionCoordinator,
    notifications: Arc<RecordingNotifications>,
    _audit_dir: tempfile::TempDir,
}

fn harness_with_balance(initial_balance: Decimal) -> Harness {
    let audit_dir = tempdir().unwrap();
    let audit = Arc::new(order_book_engine::audit::ParityAuditSink::open(audit_dir.path()).unwrap());
    let registry = Registry::new(initial_balance);
    let notifications = Arc::new(RecordingNotifications::default());
    let coordinator = SubmissionCoordinator::new(registry, audit, notifications.clone());
    Harness {
        coordinator,
        notifications,
        _audit_dir: audit_dir,
    }
}

fn harness() -> Harness {
    harness_with_balance(dec!(10_000))
}

impl Harness {
    fn register(&self, trader_id: &str) {
        self.coordinator.registry().register_trader(trader_id);
    }

    fn balance(&self, trader_id: &str) -> Decimal {
        self.coordinator
            .registry()
            .account(trader_id)
            .unwrap()
            .lock()
            .unwrap()
            .balance()
    }

    fn position(&self, trader_id: &str, symbol: &str) -> Decimal {
        self.coordinator
            .registry()
            .account(trader_id)
            .unwrap()
            .lock()
            .unwrap()
            .position(symbol)
    }

    fn submit_limit(
        &self,
        trader_id: &str,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> (Order, Vec<Trade>) {
        let order = self
            .coordinator
            .build_order(trader_id, symbol, side, OrderType::Limit, Some(price), qty)
            .unwrap();
        self.coordinator.submit(order).unwrap()
    }

    fn submit_market(&self, trader_id: &str, symbol: &str, side: OrderSide, qty: Decimal) -> (Order, Vec<Trade>) {
        let order = self
            .coordinator
            .build_order(trader_id, symbol, side, OrderType::Market, None, qty)
            .unwrap();
        self.coordinator.submit(order).unwrap()
    }
}

#[test]
fn s1_basic_cross() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");

    h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(10));
    let (_order, trades) = h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(150), dec!(10));

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, dec!(150));
    assert_eq!(trades[0].quantity, dec!(10));
    assert_eq!(h.balance("trader1"), dec!(8_500));
    assert_eq!(h.balance("trader2"), dec!(11_500));
    assert_eq!(h.position("trader1", "AAPL"), dec!(10));
    assert_eq!(h.position("trader2", "AAPL"), dec!(-10));

    let book = h.coordinator.registry().book("AAPL");
    let book = book.lock().unwrap();
    assert!(book.is_empty());

    assert!(h
        .notifications
        .lines_for("trader1")
        .iter()
        .any(|l| l.starts_with("TRADE_EXECUTED:") && l.contains("BUY")));
    assert!(h
        .notifications
        .lines_for("trader2")
        .iter()
        .any(|l| l.starts_with("SETTLEMENT:") && l.contains("-10")));
}

#[test]
fn s2_non_crossing_rest() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");

    h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(10));
    let (_order, trades) = h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(151), dec!(10));

    assert!(trades.is_empty());
    let book = h.coordinator.registry().book("AAPL");
    let book = book.lock().unwrap();
    assert_eq!(book.best_bid(), dec!(150));
    assert_eq!(book.best_ask(), dec!(151));
    drop(book);
    assert_eq!(h.balance("trader1"), dec!(10_000));
    assert_eq!(h.balance("trader2"), dec!(10_000));
}

#[test]
fn s3_partial_fill() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");

    h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(10));
    let (_order, trades) = h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(150), dec!(5));

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, dec!(5));
    assert_eq!(h.balance("trader1"), dec!(9_250));
    assert_eq!(h.balance("trader2"), dec!(10_750));
    assert_eq!(h.position("trader1", "AAPL"), dec!(5));
    assert_eq!(h.position("trader2", "AAPL"), dec!(-5));

    let book = h.coordinator.registry().book("AAPL");
    let book = book.lock().unwrap();
    assert_eq!(book.best_bid(), dec!(150));
    let resting = book.buy_orders();
    assert_eq!(resting.len(), 1);
    assert_eq!(resting[0].quantity - resting[0].filled_quantity, dec!(5));
    assert_eq!(resting[0].status, OrderStatus::PartiallyFilled);
}

#[test]
fn s4_market_against_resting_limit() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");

    h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(150), dec!(10));
    let (order, trades) = h.submit_market("trader1", "AAPL", OrderSide::Buy, dec!(10));

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, dec!(150));
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(h.balance("trader1"), dec!(8_500));
    assert_eq!(h.balance("trader2"), dec!(11_500));
}

#[test]
fn s5_price_improvement_on_aggressive_maker() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");
    h.register("trader3");

    h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(10));
    let (_o, t1) = h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(149), dec!(5));
    let (_o, t2) = h.submit_limit("trader3", "AAPL", OrderSide::Sell, dec!(150), dec!(5));

    assert_eq!(t1.len(), 1);
    assert_eq!((t1[0].price, t1[0].quantity), (dec!(149), dec!(5)));
    assert_eq!(t2.len(), 1);
    assert_eq!((t2[0].price, t2[0].quantity), (dec!(150), dec!(5)));

    assert_eq!(h.balance("trader1"), dec!(8_505));
    assert_eq!(h.balance("trader2"), dec!(10_745));
    assert_eq!(h.balance("trader3"), dec!(10_750));
}

#[test]
fn s6_multi_counterparty_fill_preserves_fifo() {
    let h = harness();
    h.register("trader1");
    h.register("trader2");
    h.register("trader3");

    h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(20));
    let (_o, t1) = h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(150), dec!(10));
    let (_o, t2) = h.submit_limit("trader3", "AAPL", OrderSide::Sell, dec!(150), dec!(10));

    assert_eq!(t1.len(), 1);
    assert_eq!(t1[0].quantity, dec!(10));
    assert_eq!(t2.len(), 1);
    assert_eq!(t2[0].quantity, dec!(10));

    assert_eq!(h.balance("trader1"), dec!(7_000));
    assert_eq!(h.balance("trader2"), dec!(11_500));
    assert_eq!(h.balance("trader3"), dec!(11_500));
    assert_eq!(h.position("trader1", "AAPL"), dec!(20));
    assert_eq!(h.position("trader2", "AAPL"), dec!(-10));
    assert_eq!(h.position("trader3", "AAPL"), dec!(-10));
}

#[test]
fn unknown_trader_is_rejected_without_touching_the_book() {
    let h = harness();
    let order = h
        .coordinator
        .build_order("ghost", "AAPL", OrderSide::Buy, OrderType::Limit, Some(dec!(100)), dec!(1))
        .unwrap();
    let err = h.coordinator.submit(order);
    assert!(err.is_err());
    let book = h.coordinator.registry().book("AAPL");
    assert!(book.lock().unwrap().is_empty());
}

#[test]
fn unfilled_market_remainder_cancels_and_notifies_submitter() {
    let h = harness();
    h.register("trader1");

    let (order, trades) = h.submit_market("trader1", "AAPL", OrderSide::Buy, dec!(5));
    assert!(trades.is_empty());
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(h
        .notifications
        .lines_for("trader1")
        .iter()
        .any(|l| l == &format!("ORDER_CANCELLED:{}:unfilled_market_remainder", order.order_id)));
}

#[test]
fn insufficient_buyer_funds_skips_transfer_but_leaves_trade_recorded() {
    let h = harness_with_balance(dec!(100));
    h.register("trader1");
    h.register("trader2");

    h.submit_limit("trader2", "AAPL", OrderSide::Sell, dec!(150), dec!(10));
    let (_order, trades) = h.submit_limit("trader1", "AAPL", OrderSide::Buy, dec!(150), dec!(10));

    assert_eq!(trades.len(), 1, "the trade still happened at match time");
    assert_eq!(h.balance("trader1"), dec!(100), "buyer leg skipped: cash untouched");
    assert_eq!(h.position("trader1", "AAPL"), Decimal::ZERO);
    assert_eq!(h.balance("trader2"), dec!(1_600), "seller is always paid");
}

#[test]
fn conservation_of_cash_and_shares_across_a_sequence() {
    let h = harness();
    for t in ["t1", "t2", "t3", "t4"] {
        h.register(t);
    }
    h.submit_limit("t1", "AAPL", OrderSide::Buy, dec!(100), dec!(10));
    h.submit_limit("t2", "AAPL", OrderSide::Sell, dec!(100), dec!(4));
    h.submit_limit("t3", "AAPL", OrderSide::Sell, dec!(99), dec!(3));
    h.submit_market("t4", "AAPL", OrderSide::Sell, dec!(3));

    let total_balance: Decimal = ["t1", "t2", "t3", "t4"].iter().map(|t| h.balance(t)).sum();
    assert_eq!(total_balance, dec!(40_000), "cash is conserved, not created or destroyed");

    let total_position: Decimal = ["t1", "t2", "t3", "t4"]
        .iter()
        .map(|t| h.position(t, "AAPL"))
        .sum();
    assert_eq!(total_position, Decimal::ZERO, "shares net to zero across all accounts");

    let book = h.coordinator.registry().book("AAPL");
    let book = book.lock().unwrap();
    if !book.best_bid().is_zero() && !book.best_ask().is_zero() {
        assert!(book.best_bid() < book.best_ask(), "book must never be crossed");
    }
}
