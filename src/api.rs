//! Read-only JSON introspection surface (§6). No order entry lives here —
//! submitting orders is wire-protocol-only; this surface only observes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::orderbook::BookSnapshot;
use crate::state::AppState;

#[derive(Serialize)]
pub struct AccountView {
    #[serde(rename = "accountId")]
    account_id: String,
    balance: rust_decimal::Decimal,
}

#[derive(Serialize)]
pub struct StatsView {
    #[serde(rename = "connectedTraders")]
    connected_traders: usize,
    #[serde(rename = "tradersWithOrders")]
    traders_with_orders: usize,
}

/// `GET /api/orderbooks` — a snapshot of every symbol that has ever been
/// referenced, even ones that are currently fully empty.
pub async fn get_order_books(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry();
    let snapshots: Vec<BookSnapshot> = registry
        .symbols()
        .into_iter()
        .map(|symbol| {
            let book = registry.book(&symbol);
            let book = book.lock().expect("book mutex poisoned");
            BookSnapshot::for_book(&book)
        })
        .collect();
    Json(snapshots)
}

/// `GET /api/orderbook/{symbol}` — an empty snapshot for an unseen symbol
/// rather than a 404, matching spec's "book created lazily" semantics without
/// actually creating one on a read.
pub async fn get_order_book(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let registry = state.registry();
    let snapshot = if registry.symbols().contains(&symbol) {
        let book = registry.book(&symbol);
        let book = book.lock().expect("book mutex poisoned");
        BookSnapshot::for_book(&book)
    } else {
        BookSnapshot::empty(symbol)
    };
    Json(snapshot)
}

/// `GET /api/account/{accountId}` — `{}` for an account that doesn't exist.
pub async fn get_account(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.registry().account(&account_id) {
        Some(account) => {
            let account = account.lock().expect("account mutex poisoned");
            Json(json!(AccountView {
                account_id: account.account_id.clone(),
                balance: account.balance(),
            }))
        }
        None => Json(json!({})),
    }
}

/// `GET /api/stats` — coarse counters, no per-trader detail.
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry();
    let connected_traders = registry.session_count();
    let traders_with_orders = registry
        .symbols()
        .iter()
        .flat_map(|symbol| {
            let book = registry.book(symbol);
            let book = book.lock().expect("book mutex poisoned");
            book.buy_orders()
                .iter()
                .chain(book.sell_orders().iter())
                .map(|o| o.trader_id.clone())
                .collect::<Vec<_>>()
        })
        .collect::<std::collections::HashSet<_>>()
        .len();
    Json(StatsView {
        connected_traders,
        traders_with_orders,
    })
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

/// Builds the introspection `Router`, CORS-open per spec and traced the way
/// the teacher instruments every other HTTP surface in this codebase.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/orderbooks", get(get_order_books))
        .route("/api/orderbook/{symbol}", get(get_order_book))
        .route("/api/account/{accountId}", get(get_account))
        .route("/api/stats", get(get_stats))
        .fallback(not_found)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
