//! Cash balance and per-symbol position for one trader.

use std::collections::HashMap;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("amount must be strictly positive")]
    NonPositiveAmount,
    #[error("insufficient balance")]
    InsufficientBalance,
}

/// Holds cash and positions for a single trader. Never constructed with a
/// negative balance; `withdraw` refuses to push it negative.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: String,
    balance: Decimal,
    positions: HashMap<String, Decimal>,
}

impl Account {
    pub fn new(account_id: impl Into<String>, initial_balance: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            balance: initial_balance,
            positions: HashMap::new(),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn positions(&self) -> &HashMap<String, Decimal> {
        &self.positions
    }

    pub fn deposit(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount <= Decimal::ZERO {
            return Err(AccountError::NonPositiveAmount);
        }
        self.balance += amount;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), AccountError> {
        if amount <= Decimal::ZERO {
            return Err(AccountError::NonPositiveAmount);
        }
        if self.balance < amount {
            return Err(AccountError::InsufficientBalance);
        }
        self.balance -= amount;
        Ok(())
    }

    /// Applies a signed quantity delta to a symbol position, pruning the entry
    /// if it nets to exactly zero.
    pub fn apply_position_delta(&mut self, symbol: &str, delta: Decimal) {
        let entry = self.positions.entry(symbol.to_string()).or_insert(Decimal::ZERO);
        *entry += delta;
        if *entry == Decimal::ZERO {
            self.positions.remove(symbol);
        }
    }
}
