use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use order_book_engine::api;
use order_book_engine::audit::ParityAuditSink;
use order_book_engine::cli::Cli;
use order_book_engine::coordinator::SubmissionCoordinator;
use order_book_engine::registry::Registry;
use order_book_engine::state::AppState;
use order_book_engine::wire::{self, WireNotificationSink};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let audit = match ParityAuditSink::open(&cli.audit_path) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            warn!(%err, path = ?cli.audit_path, "audit store failed to open; continuing without durable audit");
            return Err(anyhow::anyhow!("audit init failure: {err}"));
        }
    };

    let registry = Registry::new(cli.initial_balance);
    let notifications = Arc::new(WireNotificationSink::new(registry.clone()));
    let coordinator = Arc::new(SubmissionCoordinator::new(registry, audit, notifications));

    let trading_listener = match TcpListener::bind(("0.0.0.0", cli.trading_port)) {
        Ok(listener) => listener,
        Err(err) => {
            let reason = if err.kind() == std::io::ErrorKind::AddrInUse {
                "port already in use"
            } else {
                "bind failed"
            };
            error!(%err, port = cli.trading_port, reason, "could not start trading wire listener");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let wire_shutdown = shutdown.clone();
    let wire_coordinator = coordinator.clone();
    let wire_handle = std::thread::Builder::new()
        .name("trading-wire".into())
        .spawn(move || wire::run(trading_listener, wire_coordinator, wire_shutdown))
        .expect("failed to spawn trading wire thread");

    let http_port = cli.http_port;
    let http_state = AppState::new(coordinator);
    let http_shutdown = shutdown.clone();
    let http_handle = std::thread::Builder::new()
        .name("http-introspection".into())
        .spawn(move || run_http_server(http_port, http_state, http_shutdown))
        .expect("failed to spawn http introspection thread");

    let shutdown_for_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown_for_signal.store(true, Ordering::SeqCst);
    })?;

    info!(trading_port = cli.trading_port, http_port, "order book engine started");

    let _ = wire_handle.join();
    let _ = http_handle.join();
    info!("shutdown complete");
    Ok(())
}

/// Runs the axum introspection server on a fresh single-threaded tokio
/// runtime confined to this thread, separate from the blocking wire accept
/// loop, and polls `shutdown` to trigger a graceful stop.
fn run_http_server(port: u16, state: AppState, shutdown: Arc<AtomicBool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start tokio runtime for introspection server");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%err, port, "could not bind http introspection listener");
                return;
            }
        };
        info!(port, "http introspection listener accepting connections");
        let app = api::router(state);
        let shutdown_signal = async move {
            while !shutdown.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            error!(%err, "http introspection server exited with error");
        }
    });
}
