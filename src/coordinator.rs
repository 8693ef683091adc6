//! The sole entry point into the engine core: validate, audit, match, settle,
//! notify — one order at a time, per symbol, per spec.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::errors::EngineError;
use crate::matching::MatchingEngine;
use crate::order::{Order, OrderSide, OrderStatus, OrderType};
use crate::registry::Registry;
use crate::settlement::SettlementEngine;
use crate::trade::Trade;

/// Durable record of every order and trade the engine has seen. Best-effort:
/// a failed write is logged by the implementation and never blocks matching.
pub trait AuditSink: Send + Sync {
    fn record_order(&self, order: &Order);
    fn record_trade(&self, trade: &Trade);
}

/// Point-to-point pushes to a trader's live session. Implementations decide
/// what "no session" means (drop, queue, etc.) — the coordinator only calls.
pub trait NotificationSink: Send + Sync {
    fn notify_trade(&self, trader_id: &str, trade: &Trade, side: OrderSide);
    fn notify_settlement(
        &self,
        trader_id: &str,
        symbol: &str,
        signed_quantity: Decimal,
        price: Decimal,
    );
    fn notify_order_cancelled(&self, trader_id: &str, order_id: u64, reason: &str);
}

pub struct SubmissionCoordinator {
    registry: Registry,
    matching: MatchingEngine,
    settlement: SettlementEngine,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    next_order_id: AtomicU64,
}

impl SubmissionCoordinator {
    pub fn new(
        registry: Registry,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            matching: MatchingEngine::new(),
            settlement: SettlementEngine::new(),
            audit,
            notifications,
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Builds a validated, ingress-stamped `Order` without submitting it.
    /// Separated from `submit` so the wire layer can reject malformed frames
    /// before the order is even assigned an id.
    pub fn build_order(
        &self,
        trader_id: &str,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Result<Order, EngineError> {
        if symbol.is_empty() {
            return Err(EngineError::InvalidSymbol);
        }
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity);
        }
        if order_type == OrderType::Limit {
            match price {
                Some(p) if p > Decimal::ZERO => {}
                _ => return Err(EngineError::InvalidPrice),
            }
        }
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        Ok(Order {
            order_id,
            trader_id: trader_id.to_string(),
            symbol: symbol.to_string(),
            side,
            order_type,
            price: if order_type == OrderType::Market { None } else { price },
            quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Pending,
            timestamp: Order::now_nanos(),
        })
    }

    /// Runs the full submission path (spec §4.4, steps 1-8) for one order.
    /// Returns the final state of `incoming` (for the wire layer's direct
    /// response) and the trades it produced.
    pub fn submit(&self, mut incoming: Order) -> Result<(Order, Vec<Trade>), EngineError> {
        // 1. Trader existence check.
        if !self.registry.is_registered(&incoming.trader_id) {
            return Err(EngineError::UnknownTrader(incoming.trader_id.clone()));
        }

        // 2. Audit the order pre-match (best-effort).
        self.audit.record_order(&incoming);

        // 3-4. Acquire the book, run the matching pass.
        let book_lock = self.registry.book(&incoming.symbol);
        let trades = {
            let mut book = book_lock.lock().expect("book mutex poisoned");
            self.matching.submit(&mut incoming, &mut book)
        };

        // Audit the order again now that matching has settled its final
        // status/fill state (still best-effort, still outside any book lock).
        self.audit.record_order(&incoming);

        if incoming.status == OrderStatus::Cancelled && incoming.order_type == OrderType::Market {
            self.notifications.notify_order_cancelled(
                &incoming.trader_id,
                incoming.order_id,
                "unfilled_market_remainder",
            );
        }

        if trades.is_empty() {
            return Ok((incoming, trades));
        }

        // 5. Resolve accounts for every distinct trader id in the trades.
        let registry = self.registry.clone();
        let resolve = move |trader_id: &str| registry.account(trader_id);

        // 6. Run settlement (account lock ordering lives in SettlementEngine).
        let settlements = self.settlement.settle_trades(&trades, resolve);

        // 7. Invoke trade/settlement callbacks (audit + notification).
        for trade in &trades {
            self.audit.record_trade(trade);
            self.notifications
                .notify_trade(&trade.buy_trader_id, trade, OrderSide::Buy);
            self.notifications
                .notify_trade(&trade.sell_trader_id, trade, OrderSide::Sell);
        }
        for settled in &settlements {
            if settled.applied {
                self.notifications.notify_settlement(
                    &settled.trader_id,
                    &incoming.symbol,
                    match settled.side {
                        OrderSide::Buy => settled.quantity,
                        OrderSide::Sell => -settled.quantity,
                    },
                    settled.price,
                );
            }
        }

        // 8. Book already released (scope above dropped the guard).
        Ok((incoming, trades))
    }
}
