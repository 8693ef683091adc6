//! Crate-wide error type for everything the coordinator can reject.

use thiserror::Error;

use crate::account::AccountError;
use crate::orderbook::OrderBookError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("trader '{0}' is not registered")]
    UnknownTrader(String),

    #[error("order price must be > 0 for a limit order")]
    InvalidPrice,

    #[error("order quantity must be > 0")]
    InvalidQuantity,

    #[error("symbol must not be empty")]
    InvalidSymbol,

    #[error("order book rejected order: {0}")]
    OrderBook(#[from] OrderBookError),

    #[error("account error: {0}")]
    Account(#[from] AccountError),
}
