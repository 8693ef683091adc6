//! Line-delimited trading protocol: `REGISTER`/`ORDER` in, `REGISTERED` /
//! `ORDER_ACCEPTED` / `ORDER_REJECTED` / `ERROR` / `TRADE_EXECUTED` /
//! `SETTLEMENT` / `ORDER_CANCELLED` out. One OS thread per connection, per
//! spec §5's scheduling model — this is the one surface in the crate that
//! deliberately does *not* run on tokio.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::coordinator::{NotificationSink, SubmissionCoordinator};
use crate::order::{OrderSide, OrderType};
use crate::registry::Registry;
use crate::trade::Trade;

/// Pushes `TRADE_EXECUTED`/`SETTLEMENT`/`ORDER_CANCELLED` lines to whichever
/// session is currently registered for a trader, via the channel the wire
/// listener wired up when that session connected.
pub struct WireNotificationSink {
    registry: Registry,
}

impl WireNotificationSink {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

impl NotificationSink for WireNotificationSink {
    fn notify_trade(&self, trader_id: &str, trade: &Trade, side: OrderSide) {
        let line = format!(
            "TRADE_EXECUTED:{}:{}:{}:{}@{}",
            trade.trade_id,
            trade.symbol,
            side.as_str(),
            trade.quantity,
            trade.price
        );
        self.registry.notify(trader_id, line);
    }

    fn notify_settlement(
        &self,
        trader_id: &str,
        symbol: &str,
        signed_quantity: Decimal,
        price: Decimal,
    ) {
        let line = format!("SETTLEMENT:{symbol}:{signed_quantity}@{price}");
        self.registry.notify(trader_id, line);
    }

    fn notify_order_cancelled(&self, trader_id: &str, order_id: u64, reason: &str) {
        let line = format!("ORDER_CANCELLED:{order_id}:{reason}");
        self.registry.notify(trader_id, line);
    }
}

/// Runs the accept loop on the calling thread until `shutdown` is set,
/// spawning one handler thread per accepted connection. Intended to itself be
/// run on a dedicated thread from `main`.
pub fn run(listener: TcpListener, coordinator: Arc<SubmissionCoordinator>, shutdown: Arc<AtomicBool>) {
    listener
        .set_nonblocking(true)
        .expect("tcp listener must support non-blocking mode");
    info!(addr = ?listener.local_addr().ok(), "trading wire listener accepting connections");

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let coordinator = coordinator.clone();
                thread::Builder::new()
                    .name(format!("wire-conn-{addr}"))
                    .spawn(move || handle_connection(stream, coordinator))
                    .expect("failed to spawn connection thread");
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(25));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
    info!("trading wire listener shutting down");
}

/// Reads the next non-blank `\n`-terminated frame, `\r` tolerated. `None`
/// means EOF or a read error; the caller treats both as "close the socket".
fn read_frame<'a>(reader: &mut BufReader<TcpStream>, line: &'a mut String) -> Option<&'a str> {
    loop {
        line.clear();
        match reader.read_line(line) {
            Ok(0) => return None,
            Ok(_) => {
                let frame = line.trim_end_matches(['\n', '\r']);
                if frame.is_empty() {
                    continue;
                }
                return Some(frame);
            }
            Err(_) => return None,
        }
    }
}

fn handle_connection(stream: TcpStream, coordinator: Arc<SubmissionCoordinator>) {
    stream
        .set_nodelay(true)
        .ok();
    let peer = stream.peer_addr().ok();
    let reader_stream = stream.try_clone().expect("failed to clone connection for reading");
    let mut writer = stream;

    let mut reader = BufReader::new(reader_stream);
    let mut line = String::new();
    let mut trader_id: Option<String> = None;
    let (tx, rx) = mpsc::channel::<String>();

    // Drain outbound pushes onto the socket on a dedicated thread so a slow
    // reader never blocks a notification destined for a counterparty.
    let mut push_writer = writer.try_clone().expect("failed to clone connection for writes");
    let push_thread = thread::spawn(move || {
        for msg in rx {
            if writeln!(push_writer, "{msg}").is_err() {
                break;
            }
        }
    });

    // First frame must be REGISTER; anything else closes the connection
    // immediately with no reply, per spec.
    match read_frame(&mut reader, &mut line) {
        Some(frame) if frame.starts_with("REGISTER:") => {
            let reply = dispatch(frame, &coordinator, &mut trader_id, &tx);
            if let Some(reply) = reply {
                let _ = writeln!(writer, "{reply}");
            }
        }
        _ => {
            warn!(?peer, "connection dropped: first frame was not REGISTER");
            drop(tx);
            let _ = push_thread.join();
            return;
        }
    }

    loop {
        let Some(frame) = read_frame(&mut reader, &mut line) else {
            break;
        };
        let reply = dispatch(frame, &coordinator, &mut trader_id, &tx);
        if let Some(reply) = reply {
            if writeln!(writer, "{reply}").is_err() {
                break;
            }
        }
    }

    if let Some(id) = &trader_id {
        coordinator.registry().deregister_session(id);
    }
    drop(tx);
    let _ = push_thread.join();
    info!(?peer, ?trader_id, "wire connection closed");
}

fn dispatch(
    frame: &str,
    coordinator: &Arc<SubmissionCoordinator>,
    trader_id: &mut Option<String>,
    session_tx: &mpsc::Sender<String>,
) -> Option<String> {
    let mut parts = frame.splitn(2, ':');
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();

    match verb {
        "REGISTER" => {
            if rest.is_empty() {
                return Some("ERROR:missing trader_id".to_string());
            }
            coordinator.registry().register_trader(rest);
            coordinator.registry().register_session(rest, session_tx.clone());
            *trader_id = Some(rest.to_string());
            Some(format!("REGISTERED:{rest}"))
        }
        "ORDER" => Some(handle_order(rest, coordinator)),
        _ => Some(format!("ERROR:unknown verb {verb}")),
    }
}

fn handle_order(rest: &str, coordinator: &Arc<SubmissionCoordinator>) -> String {
    let fields: Vec<&str> = rest.split(':').collect();
    let &[trader_id, symbol, side, order_type, price, quantity] = fields.as_slice() else {
        return "ERROR:malformed ORDER frame".to_string();
    };

    let side = match side {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return format!("ERROR:unknown side {side}"),
    };
    let order_type = match order_type {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        _ => return format!("ERROR:unknown order type {order_type}"),
    };
    let price = if order_type == OrderType::Limit {
        match Decimal::from_str(price) {
            Ok(p) => Some(p),
            Err(_) => return format!("ERROR:invalid price {price}"),
        }
    } else {
        None
    };
    let quantity = match Decimal::from_str(quantity) {
        Ok(q) => q,
        Err(_) => return format!("ERROR:invalid quantity {quantity}"),
    };

    let order = match coordinator.build_order(trader_id, symbol, side, order_type, price, quantity) {
        Ok(order) => order,
        Err(err) => return format!("ERROR:{err}"),
    };
    let order_id = order.order_id;

    match coordinator.submit(order) {
        Ok((final_order, _trades)) => match final_order.status {
            crate::order::OrderStatus::Rejected => {
                format!("ORDER_REJECTED:{order_id}:rejected")
            }
            _ => format!("ORDER_ACCEPTED:{order_id}"),
        },
        Err(err) => {
            error!(order_id, %err, "order submission failed");
            format!("ORDER_REJECTED:{order_id}:{err}")
        }
    }
}
