// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static BOOK_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("book_updates_total", "order book snapshots per instrument"),
        &["instrument"],
    )
    .unwrap()
});

pub static TRADE_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trade_ticks_total", "trade tick snapshots per instrument"),
        &["instrument"],
    )
    .unwrap()
});

pub static TRIGGER_PX: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("trigger_price", "fee-adjusted trigger prices derived from the future"),
        &["trigger"],
    )
    .unwrap()
});

pub static FUTURE_TOP_VOLUME: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("future_top_volume", "future best level volume"),
        &["side"],
    )
    .unwrap()
});

// -------- Policy & orders --------
pub static POLICY_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("policy_decisions_total", "quoting rule that fired per ETF snapshot"),
        &["rule"],
    )
    .unwrap()
});

pub static ORDERS_INSERTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_inserted_total", "insert commands sent"),
        &["side", "lifespan"],
    )
    .unwrap()
});

pub static CANCELS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("cancels_total", "cancel commands sent").unwrap());

pub static HEDGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("hedges_total", "hedge commands sent"), &["side"]).unwrap()
});

pub static FILLED_VOLUME: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filled_volume_total", "lots filled on our ETF orders"),
        &["side"],
    )
    .unwrap()
});

pub static VENUE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("venue_errors_total", "error notifications (label: tracked|untracked|hedge)"),
        &["kind"],
    )
    .unwrap()
});

pub static SINK_DROPPED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("commands_dropped_total", "commands dropped on a full channel").unwrap());

pub static LIVE_ORDERS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("live_orders", "orders currently tracked").unwrap());

pub static RESTING_PX: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("resting_quote_price", "price of our resting quote (0 = none)"),
        &["side"],
    )
    .unwrap()
});

// -------- Inventory --------
pub static POSITION: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("etf_position", "net ETF position (lots)").unwrap());

pub static HEDGE_POSITION: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("future_hedge_position", "net future hedge position (lots)").unwrap());

pub static FEES_TOTAL: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("fees_total", "accumulated fees, negative = net rebate").unwrap());

// -------- Venue transport / simulator --------
pub static VENUE_EXECS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("venue_exec_reports_total", "simulator execution reports"),
        &["status"],
    )
    .unwrap()
});

pub static WS_CONNECTED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("venue_ws_connected", "1 if the venue websocket is connected").unwrap());

pub static WS_RECONNECTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("venue_ws_reconnects_total", "venue websocket reconnects").unwrap());

// ---- Config visibility ----
pub static CONFIG_VENUE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_venue_mode", "venue mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub static CONFIG_PARAM: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("config_param", "trading constants (label: name)"),
        &["name"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(BOOK_UPDATES.clone())),
        REGISTRY.register(Box::new(TRADE_TICKS.clone())),
        REGISTRY.register(Box::new(TRIGGER_PX.clone())),
        REGISTRY.register(Box::new(FUTURE_TOP_VOLUME.clone())),
        REGISTRY.register(Box::new(POLICY_DECISIONS.clone())),
        REGISTRY.register(Box::new(ORDERS_INSERTED.clone())),
        REGISTRY.register(Box::new(CANCELS.clone())),
        REGISTRY.register(Box::new(HEDGES.clone())),
        REGISTRY.register(Box::new(FILLED_VOLUME.clone())),
        REGISTRY.register(Box::new(VENUE_ERRORS.clone())),
        REGISTRY.register(Box::new(SINK_DROPPED.clone())),
        REGISTRY.register(Box::new(LIVE_ORDERS.clone())),
        REGISTRY.register(Box::new(RESTING_PX.clone())),
        REGISTRY.register(Box::new(POSITION.clone())),
        REGISTRY.register(Box::new(HEDGE_POSITION.clone())),
        REGISTRY.register(Box::new(FEES_TOTAL.clone())),
        REGISTRY.register(Box::new(VENUE_EXECS.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(CONFIG_VENUE_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_PARAM.clone())),
    ] {
        if let Err(e) = m {
            error!(?e, "metric registration failed");
        }
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, %addr, "metrics bind failed");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
