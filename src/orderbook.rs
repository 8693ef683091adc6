//! Per-symbol limit order book: two price-indexed FIFO queues plus an
//! `order_id -> slot` index for O(1) lookup.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderSide};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderBookError {
    #[error("order is not in a restable state")]
    NotRestable,
    #[error("order id already indexed")]
    DuplicateOrderId,
}

/// One symbol's book. `bids`/`asks` are both stored ascending by price; callers
/// that need descending bid order (highest first) iterate `.rev()`.
pub struct OrderBook {
    pub symbol: String,
    pub(crate) bids: BTreeMap<Decimal, VecDeque<Order>>,
    pub(crate) asks: BTreeMap<Decimal, VecDeque<Order>>,
    /// order_id -> (price, position within that price level's queue).
    index: HashMap<u64, (Decimal, usize)>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn side_map(&mut self, side: OrderSide) -> &mut BTreeMap<Decimal, VecDeque<Order>> {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }

    /// Gives the matching engine direct mutable access to one side's price
    /// levels, since the crossing walk must mutate resting orders in place.
    pub(crate) fn matching_side_mut(
        &mut self,
        side: OrderSide,
    ) -> &mut BTreeMap<Decimal, VecDeque<Order>> {
        self.side_map(side)
    }

    /// Rebuilds `index` entries for one side after the matching engine pops
    /// filled orders directly out of a level's queue mid-walk (cheaper than
    /// routing every fill through [`OrderBook::remove`]). Any index entry
    /// pointing at a price level on this side whose order is no longer present
    /// there is dropped; survivors get their position recomputed.
    pub(crate) fn reindex_side(&mut self, side: OrderSide) {
        let map = match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        };
        let mut still_present = std::collections::HashSet::new();
        let mut updates = Vec::new();
        for (price, level) in map.iter() {
            for (pos, order) in level.iter().enumerate() {
                still_present.insert(order.order_id);
                updates.push((order.order_id, *price, pos));
            }
        }
        let side_prices: std::collections::HashSet<Decimal> = map.keys().copied().collect();
        self.index
            .retain(|id, (p, _)| !side_prices.contains(p) || still_present.contains(id));
        for (order_id, price, pos) in updates {
            self.index.insert(order_id, (price, pos));
        }
    }

    /// Drops any price level that the matching walk emptied out.
    pub(crate) fn prune_empty_levels(&mut self, side: OrderSide) {
        let map = self.side_map(side);
        map.retain(|_, level| !level.is_empty());
    }

    /// Adds a resting order to its side/price level, appending to FIFO order.
    pub fn add(&mut self, order: Order) -> Result<(), OrderBookError> {
        if !order.status.is_resting() || order.filled_quantity >= order.quantity {
            return Err(OrderBookError::NotRestable);
        }
        if self.index.contains_key(&order.order_id) {
            return Err(OrderBookError::DuplicateOrderId);
        }
        let price = order.price.expect("resting order must carry a limit price");
        let order_id = order.order_id;
        let side = order.side;
        let map = self.side_map(side);
        let level = map.entry(price).or_default();
        let pos = level.len();
        level.push_back(order);
        self.index.insert(order_id, (price, pos));
        Ok(())
    }

    /// Removes `order_id` if present, reindexing the tail of its price level so
    /// `index` stays consistent, and dropping the level if it's now empty.
    pub fn remove(&mut self, order_id: u64) -> bool {
        let Some((price, position)) = self.index.get(&order_id).copied() else {
            return false;
        };
        for side in [OrderSide::Buy, OrderSide::Sell] {
            let map = self.side_map(side);
            if let Some(level) = map.get_mut(&price) {
                if level.get(position).map(|o| o.order_id) == Some(order_id) {
                    level.remove(position);
                    self.index.remove(&order_id);
                    if level.is_empty() {
                        map.remove(&price);
                    } else {
                        let tail: Vec<(u64, usize)> = map
                            .get(&price)
                            .unwrap()
                            .iter()
                            .enumerate()
                            .skip(position)
                            .map(|(pos, o)| (o.order_id, pos))
                            .collect();
                        for (oid, pos) in tail {
                            self.index.insert(oid, (price, pos));
                        }
                    }
                    return true;
                }
            }
        }
        false
    }

    /// Highest resting bid price, or [`Decimal::ZERO`] when the bid side is empty.
    pub fn best_bid(&self) -> Decimal {
        self.bids.keys().next_back().copied().unwrap_or(Decimal::ZERO)
    }

    /// Lowest resting ask price, or [`Decimal::ZERO`] when the ask side is empty.
    pub fn best_ask(&self) -> Decimal {
        self.asks.keys().next().copied().unwrap_or(Decimal::ZERO)
    }

    pub fn get(&self, order_id: u64) -> Option<&Order> {
        let (price, position) = *self.index.get(&order_id)?;
        self.bids
            .get(&price)
            .or_else(|| self.asks.get(&price))
            .and_then(|level| level.get(position))
            .filter(|o| o.order_id == order_id)
    }

    /// Snapshot of bids, highest price first, FIFO within a level.
    pub fn buy_orders(&self) -> Vec<Order> {
        self.bids
            .iter()
            .rev()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Snapshot of asks, lowest price first, FIFO within a level.
    pub fn sell_orders(&self) -> Vec<Order> {
        self.asks
            .iter()
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Serializable snapshot used by the introspection HTTP surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    #[serde(rename = "bestBid")]
    pub best_bid: Decimal,
    #[serde(rename = "bestAsk")]
    pub best_ask: Decimal,
    #[serde(rename = "buyOrders")]
    pub buy_orders: Vec<OrderView>,
    #[serde(rename = "sellOrders")]
    pub sell_orders: Vec<OrderView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "traderId")]
    pub trader_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    #[serde(rename = "filledQuantity")]
    pub filled_quantity: Decimal,
    pub status: crate::order::OrderStatus,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        OrderView {
            order_id: o.order_id,
            trader_id: o.trader_id.clone(),
            price: o.price.unwrap_or(Decimal::ZERO),
            quantity: o.quantity,
            filled_quantity: o.filled_quantity,
            status: o.status,
        }
    }
}

impl BookSnapshot {
    pub fn for_book(book: &OrderBook) -> Self {
        BookSnapshot {
            symbol: book.symbol.clone(),
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            buy_orders: book.buy_orders().iter().map(OrderView::from).collect(),
            sell_orders: book.sell_orders().iter().map(OrderView::from).collect(),
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        BookSnapshot {
            symbol: symbol.into(),
            best_bid: Decimal::ZERO,
            best_ask: Decimal::ZERO,
            buy_orders: Vec::new(),
            sell_orders: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderStatus, OrderType};
    use rust_decimal_macros::dec;

    fn limit(id: u64, side: OrderSide, price: Decimal, qty: Decimal) -> Order {
        Order {
            order_id: id,
            trader_id: format!("trader{id}"),
            symbol: "AAPL".into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity: qty,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Pending,
            timestamp: id as u128,
        }
    }

    #[test]
    fn empty_book_has_zero_sentinels() {
        let book = OrderBook::new("AAPL");
        assert_eq!(book.best_bid(), Decimal::ZERO);
        assert_eq!(book.best_ask(), Decimal::ZERO);
    }

    #[test]
    fn add_and_lookup_roundtrip() {
        let mut book = OrderBook::new("AAPL");
        book.add(limit(1, OrderSide::Buy, dec!(150), dec!(10))).unwrap();
        assert_eq!(book.best_bid(), dec!(150));
        assert_eq!(book.get(1).unwrap().order_id, 1);
    }

    #[test]
    fn remove_reindexes_tail_and_drops_empty_level() {
        let mut book = OrderBook::new("AAPL");
        book.add(limit(1, OrderSide::Buy, dec!(150), dec!(10))).unwrap();
        book.add(limit(2, OrderSide::Buy, dec!(150), dec!(5))).unwrap();
        book.add(limit(3, OrderSide::Buy, dec!(150), dec!(3))).unwrap();

        assert!(book.remove(1));
        let remaining = book.buy_orders();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].order_id, 2);
        assert_eq!(remaining[1].order_id, 3);
        assert!(book.get(2).is_some());
        assert!(book.get(3).is_some());

        assert!(book.remove(2));
        assert!(book.remove(3));
        assert!(book.bids.is_empty(), "price level should be pruned once empty");
    }

    #[test]
    fn remove_nonexistent_returns_false() {
        let mut book = OrderBook::new("AAPL");
        assert!(!book.remove(999));
    }

    #[test]
    fn fifo_time_priority_within_level() {
        let mut book = OrderBook::new("AAPL");
        book.add(limit(1, OrderSide::Sell, dec!(100), dec!(4))).unwrap();
        book.add(limit(2, OrderSide::Sell, dec!(100), dec!(6))).unwrap();
        let orders = book.sell_orders();
        assert_eq!(orders[0].order_id, 1);
        assert_eq!(orders[1].order_id, 2);
    }

    #[test]
    fn buy_orders_sorted_descending_sell_ascending() {
        let mut book = OrderBook::new("AAPL");
        book.add(limit(1, OrderSide::Buy, dec!(100), dec!(1))).unwrap();
        book.add(limit(2, OrderSide::Buy, dec!(102), dec!(1))).unwrap();
        book.add(limit(3, OrderSide::Sell, dec!(105), dec!(1))).unwrap();
        book.add(limit(4, OrderSide::Sell, dec!(103), dec!(1))).unwrap();

        let bids = book.buy_orders();
        assert_eq!(bids[0].order_id, 2);
        assert_eq!(bids[1].order_id, 1);

        let asks = book.sell_orders();
        assert_eq!(asks[0].order_id, 4);
        assert_eq!(asks[1].order_id, 3);
    }
}
