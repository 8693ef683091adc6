//! Command-line surface: `<binary> [trading_port] [http_port] [--initial-balance]`.

use clap::Parser;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "order-book-engine")]
#[command(version, about = "Multi-symbol limit order book and matching engine")]
pub struct Cli {
    /// Port the line-delimited trading protocol listens on.
    #[arg(default_value_t = 8888)]
    pub trading_port: u16,

    /// Port the read-only HTTP introspection surface listens on.
    #[arg(default_value_t = 8080)]
    pub http_port: u16,

    /// Starting cash balance for a trader's account, seeded on first REGISTER.
    #[arg(long, default_value = "10000")]
    pub initial_balance: Decimal,

    /// Directory for the embedded audit store.
    #[arg(long, default_value = "audit_store")]
    pub audit_path: std::path::PathBuf,
}
