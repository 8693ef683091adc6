//! An executed crossing between two orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub buy_trader_id: String,
    pub sell_trader_id: String,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: u128,
}

impl Trade {
    /// The stable string form used at the wire and audit boundary, e.g.
    /// `TRADE_00000001`.
    pub fn trade_id_str(&self) -> String {
        format!("TRADE_{:08}", self.trade_id)
    }

    pub fn trader_id(&self, side: OrderSide) -> &str {
        match side {
            OrderSide::Buy => &self.buy_trader_id,
            OrderSide::Sell => &self.sell_trader_id,
        }
    }

    pub fn order_id(&self, side: OrderSide) -> u64 {
        match side {
            OrderSide::Buy => self.buy_order_id,
            OrderSide::Sell => self.sell_order_id,
        }
    }

    /// Signed quantity for the given side: positive for the buyer, negative for
    /// the seller (§6 `SETTLEMENT` push convention).
    pub fn signed_quantity(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.quantity,
            OrderSide::Sell => -self.quantity,
        }
    }
}
