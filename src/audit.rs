//! Durable, best-effort record of every order and trade the engine has seen.
//!
//! Backed by an embedded `parity-db` store rather than the external
//! Postgres-style database the original engine reached for — this keeps the
//! audit trail in-process, with no connection string or migration step, which
//! is the corpus's idiom for an embedded append/upsert log. Per spec §5/§7,
//! audit failures are logged and never propagate into the matching path.

use std::path::Path;
use std::sync::Mutex;

use bincode::config::{self, standard};
use parity_db::{ColId, Db, Options};
use thiserror::Error;
use tracing::warn;

use crate::coordinator::AuditSink;
use crate::order::Order;
use crate::trade::Trade;

const ORDERS_COL: ColId = 0;
const TRADES_COL: ColId = 1;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("parity-db error: {0}")]
    Db(#[from] parity_db::Error),
    #[error("bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// `parity-db`-backed [`AuditSink`]. One column for orders keyed by
/// `order_id` (big-endian, so an upsert just overwrites the value), one for
/// trades keyed by `trade_id` (append-only in practice since trade ids never
/// repeat).
pub struct ParityAuditSink {
    db: Mutex<Db>,
}

impl ParityAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 2);
        opts.columns[ORDERS_COL as usize].btree_index = true;
        opts.columns[TRADES_COL as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn put_order(&self, order: &Order) -> AuditResult<()> {
        let value = bincode::encode_to_vec(order_row(order), standard())?;
        let mut db = self.db.lock().expect("audit db mutex poisoned");
        db.commit(vec![(ORDERS_COL, order.order_id.to_be_bytes().to_vec(), Some(value))])?;
        Ok(())
    }

    fn put_trade(&self, trade: &Trade) -> AuditResult<()> {
        let value = bincode::encode_to_vec(trade_row(trade), standard())?;
        let mut db = self.db.lock().expect("audit db mutex poisoned");
        db.commit(vec![(TRADES_COL, trade.trade_id.to_be_bytes().to_vec(), Some(value))])?;
        Ok(())
    }

    /// Reads back one order row, for tests and any future audit-replay tool.
    pub fn get_order(&self, order_id: u64) -> AuditResult<Option<OrderRow>> {
        let db = self.db.lock().expect("audit db mutex poisoned");
        match db.get(ORDERS_COL, &order_id.to_be_bytes())? {
            Some(raw) => {
                let (row, _): (OrderRow, usize) = bincode::decode_from_slice(&raw, standard())?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    pub fn get_trade(&self, trade_id: u64) -> AuditResult<Option<TradeRow>> {
        let db = self.db.lock().expect("audit db mutex poisoned");
        match db.get(TRADES_COL, &trade_id.to_be_bytes())? {
            Some(raw) => {
                let config = config::standard();
                let (row, _): (TradeRow, usize) = bincode::decode_from_slice(&raw, config)?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

/// The abstract order schema from spec §6: `(order_id, trader_id, symbol,
/// side, type, price, quantity, filled_quantity, status, timestamp)`.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct OrderRow {
    pub order_id: u64,
    pub trader_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub price: Option<String>,
    pub quantity: String,
    pub filled_quantity: String,
    pub status: String,
    pub timestamp: u128,
}

fn order_row(order: &Order) -> OrderRow {
    OrderRow {
        order_id: order.order_id,
        trader_id: order.trader_id.clone(),
        symbol: order.symbol.clone(),
        side: order.side.as_str().to_string(),
        order_type: format!("{:?}", order.order_type),
        price: order.price.map(|p| p.to_string()),
        quantity: order.quantity.to_string(),
        filled_quantity: order.filled_quantity.to_string(),
        status: format!("{:?}", order.status),
        timestamp: order.timestamp,
    }
}

/// The abstract trade schema from spec §6: `(trade_id, buy_order_id,
/// sell_order_id, symbol, buyer_id, seller_id, price, quantity, timestamp)`.
/// `rust_decimal::Decimal` has no bincode `Encode`/`Decode` impl under the
/// enabled features, so price/quantity travel as strings, same as `OrderRow`.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct TradeRow {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub buy_trader_id: String,
    pub sell_trader_id: String,
    pub symbol: String,
    pub price: String,
    pub quantity: String,
    pub timestamp: u128,
}

fn trade_row(trade: &Trade) -> TradeRow {
    TradeRow {
        trade_id: trade.trade_id,
        buy_order_id: trade.buy_order_id,
        sell_order_id: trade.sell_order_id,
        buy_trader_id: trade.buy_trader_id.clone(),
        sell_trader_id: trade.sell_trader_id.clone(),
        symbol: trade.symbol.clone(),
        price: trade.price.to_string(),
        quantity: trade.quantity.to_string(),
        timestamp: trade.timestamp,
    }
}

impl AuditSink for ParityAuditSink {
    fn record_order(&self, order: &Order) {
        if let Err(err) = self.put_order(order) {
            warn!(order_id = order.order_id, %err, "failed to persist order to audit store");
        }
    }

    fn record_trade(&self, trade: &Trade) {
        if let Err(err) = self.put_trade(trade) {
            warn!(trade_id = trade.trade_id, %err, "failed to persist trade to audit store");
        }
    }
}
