//! Price-time priority crossing engine: matches one incoming order against a
//! resting book, one symbol at a time.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;

use crate::order::{Order, OrderSide, OrderStatus, OrderType};
use crate::orderbook::OrderBook;
use crate::trade::Trade;

/// Stateless except for the trade-id counter; one instance is shared across
/// every symbol's book (trade ids are engine-global, not per-symbol).
pub struct MatchingEngine {
    next_trade_id: AtomicU64,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            next_trade_id: AtomicU64::new(1),
        }
    }

    fn next_trade_id(&self) -> u64 {
        self.next_trade_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs the crossing pass for `incoming` against the opposite side of
    /// `book`, mutating `incoming` and any partially-consumed resting orders in
    /// place, and resting `incoming` itself if it is an unfilled Limit order.
    ///
    /// Returns the trades emitted, in the order candidates were consumed.
    pub fn submit(&self, incoming: &mut Order, book: &mut OrderBook) -> Vec<Trade> {
        let mut trades = Vec::new();

        if incoming.quantity <= Decimal::ZERO || incoming.is_fully_filled() {
            return trades;
        }

        let opposite = incoming.side.opposite();
        let descending = incoming.side == OrderSide::Sell;

        {
            let levels = book.matching_side_mut(opposite);
            let price_keys: Vec<Decimal> = if descending {
                levels.keys().rev().copied().collect()
            } else {
                levels.keys().copied().collect()
            };

            'outer: for price in price_keys {
                if incoming.remaining() <= Decimal::ZERO {
                    break;
                }
                if incoming.order_type == OrderType::Limit {
                    let limit_price = incoming
                        .price
                        .expect("limit order must carry a price");
                    let crosses = match incoming.side {
                        OrderSide::Buy => limit_price >= price,
                        OrderSide::Sell => limit_price <= price,
                    };
                    if !crosses {
                        break 'outer;
                    }
                }

                let Some(level) = levels.get_mut(&price) else {
                    continue;
                };

                loop {
                    if incoming.remaining() <= Decimal::ZERO {
                        break;
                    }
                    let Some(candidate) = level.front_mut() else {
                        break;
                    };
                    if candidate.remaining() <= Decimal::ZERO {
                        // Defensive: invariants should prevent this.
                        level.pop_front();
                        continue;
                    }

                    let trade_qty = incoming.remaining().min(candidate.remaining());
                    let maker_price = candidate.price.expect("resting order must carry a price");
                    let trade_price = match incoming.order_type {
                        OrderType::Market => maker_price,
                        OrderType::Limit => {
                            let taker_price = incoming.price.expect("limit order must carry a price");
                            taker_price.min(maker_price)
                        }
                    };

                    let (buy_order, sell_order) = match incoming.side {
                        OrderSide::Buy => (&*incoming, &*candidate),
                        OrderSide::Sell => (&*candidate, &*incoming),
                    };
                    let trade = Trade {
                        trade_id: self.next_trade_id(),
                        buy_order_id: buy_order.order_id,
                        sell_order_id: sell_order.order_id,
                        buy_trader_id: buy_order.trader_id.clone(),
                        sell_trader_id: sell_order.trader_id.clone(),
                        symbol: incoming.symbol.clone(),
                        price: trade_price,
                        quantity: trade_qty,
                        timestamp: Order::now_nanos(),
                    };

                    incoming.filled_quantity += trade_qty;
                    candidate.filled_quantity += trade_qty;
                    incoming.status = status_for_fill(incoming.filled_quantity, incoming.quantity);
                    candidate.status = status_for_fill(candidate.filled_quantity, candidate.quantity);

                    trades.push(trade);

                    if candidate.is_fully_filled() {
                        level.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }

        book.reindex_side(opposite);
        book.prune_empty_levels(opposite);

        if incoming.remaining() > Decimal::ZERO && !incoming.status.is_terminal() {
            match incoming.order_type {
                OrderType::Market => {
                    incoming.status = OrderStatus::Cancelled;
                }
                OrderType::Limit => {
                    incoming.status = if incoming.filled_quantity > Decimal::ZERO {
                        OrderStatus::PartiallyFilled
                    } else {
                        OrderStatus::Pending
                    };
                    book.add(incoming.clone())
                        .expect("incoming order has a fresh id and is resting-eligible");
                }
            }
        }

        trades
    }
}

fn status_for_fill(filled: Decimal, quantity: Decimal) -> OrderStatus {
    if filled >= quantity {
        OrderStatus::Filled
    } else {
        OrderStatus::PartiallyFilled
    }
}
