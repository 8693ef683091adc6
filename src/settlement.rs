//! Cash/position transfer for executed trades.
//!
//! Mirrors the original engine's settlement step: debit the buyer, credit the
//! seller, move positions both ways. Locking pairs of accounts is the
//! coordinator's job (§5) — this type takes no locks itself and assumes its
//! caller already holds whatever it needs for the duration of `settle`.

use rust_decimal::Decimal;
use tracing::warn;

use crate::account::Account;
use crate::order::OrderSide;
use crate::trade::Trade;

/// Emitted for each settled leg so the coordinator can push `SETTLEMENT`
/// notifications without re-deriving the numbers.
#[derive(Debug, Clone)]
pub struct SettlementResult {
    pub trade_id: u64,
    pub trader_id: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub notional: Decimal,
    /// `false` when the buyer leg was skipped for insufficient funds; the
    /// seller leg is unconditional and always `true`.
    pub applied: bool,
}

#[derive(Default)]
pub struct SettlementEngine;

impl SettlementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Settles one trade against its two already-resolved accounts.
    ///
    /// The seller is always paid and debited the position. The buyer's funds
    /// are checked first: a buyer who can't cover the notional has that leg
    /// skipped (logged, not reversed) and still keeps the shares matched
    /// against them — a known gap in the original engine, preserved here
    /// rather than silently patched, since correcting it changes trade
    /// semantics the matching engine has already committed to.
    pub fn settle(
        &self,
        trade: &Trade,
        buyer: &mut Account,
        seller: &mut Account,
    ) -> Vec<SettlementResult> {
        let notional = trade.price * trade.quantity;
        let mut results = Vec::with_capacity(2);

        let buyer_applied = match buyer.withdraw(notional) {
            Ok(()) => {
                buyer.apply_position_delta(&trade.symbol, trade.quantity);
                true
            }
            Err(err) => {
                warn!(
                    trade_id = trade.trade_id,
                    trader_id = %buyer.account_id,
                    %notional,
                    error = %err,
                    "buyer could not cover trade notional; settlement leg skipped"
                );
                false
            }
        };
        results.push(SettlementResult {
            trade_id: trade.trade_id,
            trader_id: buyer.account_id.clone(),
            side: OrderSide::Buy,
            quantity: trade.quantity,
            price: trade.price,
            notional,
            applied: buyer_applied,
        });

        seller
            .deposit(notional)
            .expect("trade notional is always strictly positive");
        seller.apply_position_delta(&trade.symbol, -trade.quantity);
        results.push(SettlementResult {
            trade_id: trade.trade_id,
            trader_id: seller.account_id.clone(),
            side: OrderSide::Sell,
            quantity: trade.quantity,
            price: trade.price,
            notional,
            applied: true,
        });

        results
    }

    /// Settles a batch in presented order, one account pair at a time.
    pub fn settle_trades(
        &self,
        trades: &[Trade],
        mut resolve: impl FnMut(&str) -> Option<std::sync::Arc<std::sync::Mutex<Account>>>,
    ) -> Vec<SettlementResult> {
        let mut all = Vec::with_capacity(trades.len() * 2);
        for trade in trades {
            let Some(buyer_lock) = resolve(&trade.buy_trader_id) else {
                warn!(trade_id = trade.trade_id, trader_id = %trade.buy_trader_id, "unknown buyer account at settlement");
                continue;
            };
            let Some(seller_lock) = resolve(&trade.sell_trader_id) else {
                warn!(trade_id = trade.trade_id, trader_id = %trade.sell_trader_id, "unknown seller account at settlement");
                continue;
            };

            if std::sync::Arc::ptr_eq(&buyer_lock, &seller_lock) {
                // Self-trade: a single lock covers both legs.
                let mut acc = buyer_lock.lock().expect("account mutex poisoned");
                let results = self.settle_self_trade(trade, &mut acc);
                all.extend(results);
                continue;
            }

            // Lock in a fixed, trader-id order regardless of buy/sell role so two
            // concurrent trades between the same pair can never deadlock.
            let results = if trade.buy_trader_id <= trade.sell_trader_id {
                let mut buyer = buyer_lock.lock().expect("account mutex poisoned");
                let mut seller = seller_lock.lock().expect("account mutex poisoned");
                self.settle(trade, &mut buyer, &mut seller)
            } else {
                let mut seller = seller_lock.lock().expect("account mutex poisoned");
                let mut buyer = buyer_lock.lock().expect("account mutex poisoned");
                self.settle(trade, &mut buyer, &mut seller)
            };
            all.extend(results);
        }
        all
    }

    /// A self-trade nets to zero cash/position change on success: the same
    /// account withdraws and is then paid back the identical notional, and its
    /// position moves `+quantity` then `-quantity`. If the buyer leg can't be
    /// funded, the seller leg is gated on it too — crediting the deposit
    /// unconditionally here (unlike the two-account path) would mint notional
    /// out of nothing rather than just under-transferring it, since there is
    /// no counterparty account to have genuinely earned that cash.
    fn settle_self_trade(&self, trade: &Trade, acc: &mut Account) -> Vec<SettlementResult> {
        let notional = trade.price * trade.quantity;
        let buyer_applied = acc.withdraw(notional).is_ok();
        if buyer_applied {
            acc.apply_position_delta(&trade.symbol, trade.quantity);
            acc.deposit(notional).expect("trade notional is always strictly positive");
            acc.apply_position_delta(&trade.symbol, -trade.quantity);
        } else {
            warn!(
                trade_id = trade.trade_id,
                trader_id = %acc.account_id,
                %notional,
                "self-trade buyer leg could not cover notional; both legs skipped"
            );
        }
        vec![
            SettlementResult {
                trade_id: trade.trade_id,
                trader_id: acc.account_id.clone(),
                side: OrderSide::Buy,
                quantity: trade.quantity,
                price: trade.price,
                notional,
                applied: buyer_applied,
            },
            SettlementResult {
                trade_id: trade.trade_id,
                trader_id: acc.account_id.clone(),
                side: OrderSide::Sell,
                quantity: trade.quantity,
                price: trade.price,
                notional,
                applied: buyer_applied,
            },
        ]
    }
}
