//! Shared, lazily-populated state: trader accounts, per-symbol books, and the
//! outbound channel each connected trader's session exposes for pushes.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use crate::account::Account;
use crate::orderbook::OrderBook;

/// One connected trader's push channel. The wire frontend owns the receiving
/// end; the registry only needs to know where to send.
pub type SessionHandle = Sender<String>;

#[derive(Clone)]
pub struct Registry {
    initial_balance: Decimal,
    accounts: Arc<Mutex<HashMap<String, Arc<Mutex<Account>>>>>,
    books: Arc<Mutex<HashMap<String, Arc<Mutex<OrderBook>>>>>,
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl Registry {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            accounts: Arc::new(Mutex::new(HashMap::new())),
            books: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a trader, creating a fresh account at the default initial
    /// balance the first time this id is seen. Idempotent on repeat calls.
    pub fn register_trader(&self, trader_id: &str) -> Arc<Mutex<Account>> {
        let mut accounts = self.accounts.lock().expect("account table poisoned");
        accounts
            .entry(trader_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(trader_id, self.initial_balance))))
            .clone()
    }

    pub fn is_registered(&self, trader_id: &str) -> bool {
        self.accounts.lock().expect("account table poisoned").contains_key(trader_id)
    }

    pub fn account(&self, trader_id: &str) -> Option<Arc<Mutex<Account>>> {
        self.accounts.lock().expect("account table poisoned").get(trader_id).cloned()
    }

    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.lock().expect("account table poisoned").keys().cloned().collect()
    }

    /// Returns the book for `symbol`, creating an empty one on first reference.
    pub fn book(&self, symbol: &str) -> Arc<Mutex<OrderBook>> {
        let mut books = self.books.lock().expect("book table poisoned");
        books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(symbol))))
            .clone()
    }

    /// Existing symbols, for the `/api/orderbooks` listing. Never creates one.
    pub fn symbols(&self) -> Vec<String> {
        self.books.lock().expect("book table poisoned").keys().cloned().collect()
    }

    pub fn register_session(&self, trader_id: &str, handle: SessionHandle) {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .insert(trader_id.to_string(), handle);
    }

    pub fn deregister_session(&self, trader_id: &str) {
        self.sessions.lock().expect("session table poisoned").remove(trader_id);
    }

    /// Count of currently connected sessions, for `/api/stats`. Distinct from
    /// `account_ids().len()`: accounts live for the process lifetime, sessions
    /// drop on disconnect.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session table poisoned").len()
    }

    /// Best-effort push to a trader's live connection. Returns `false` (and
    /// drops the message) when the trader has no open session or the
    /// connection has gone away — callers must not treat this as fatal.
    pub fn notify(&self, trader_id: &str, message: String) -> bool {
        let sessions = self.sessions.lock().expect("session table poisoned");
        match sessions.get(trader_id) {
            Some(handle) => handle.send(message).is_ok(),
            None => false,
        }
    }
}
