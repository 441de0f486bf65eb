// ===============================
// src/main.rs
// ===============================
/*
 cd etf_mm_rust

 # konfigurasi yang aktif
curl -s localhost:9898/metrics | egrep '^config_(venue_mode|param)'

# posisi, hedge & keputusan policy
curl -s localhost:9898/metrics | egrep '^(etf_position|future_hedge_position|fees_total)'
curl -s localhost:9898/metrics | grep '^policy_decisions_total'

*/
/*
=============================================================================
Project : etf_mm_rust — ETF/future market-making & hedging engine in Rust
Module  : main.rs
Version : 0.1.0
Author  : etf_mm_rust contributors
License : MIT (see LICENSE)

Summary : Quotes an ETF against a reference future using fee-adjusted
          trigger prices, crosses with fill-and-kill orders when the
          future makes it profitable, hedges every fill in the future,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 etf_mm_rust contributors.
=============================================================================
*/
mod domain;
mod config;
mod metrics;
mod recorder;
mod market;
mod orders;
mod strategy;
mod positions;
mod lifecycle;
mod trader;
mod feed;        // mock market data (future + ETF)
mod gateway;     // mock venue (exchange simulator)
mod venue_ws;    // real venue via JSON websocket

use tokio::{
    select,
    sync::{broadcast, mpsc},
    time::{interval, Duration},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::{BookSnapshot, Command, Event, VenueEvent};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config & trading constants ----
    let (args, params) = match config::load() {
        Ok(v) => v,
        Err(e) => {
            error!(%e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    info!(
        venue_mode = args.venue_mode.label(),
        venue_ws = %args.venue_ws_url,
        position_limit = params.position_limit,
        order_lot = params.order_lot,
        tick_size = params.tick_size,
        taker_fee = params.taker_fee,
        maker_fee = params.maker_fee,
        max_lot = params.max_lot,
        "startup config"
    );
    crate::metrics::CONFIG_VENUE_MODE
        .with_label_values(&[args.venue_mode.label()])
        .set(1);
    for (name, v) in [
        ("position_limit", params.position_limit as f64),
        ("order_lot", params.order_lot as f64),
        ("tick_size", params.tick_size as f64),
        ("taker_fee", params.taker_fee),
        ("maker_fee", params.maker_fee),
        ("max_lot", params.max_lot as f64),
    ] {
        crate::metrics::CONFIG_PARAM.with_label_values(&[name]).set(v);
    }

    // ---- Buses ----
    let (ev_tx, ev_rx) = mpsc::channel::<VenueEvent>(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(2048);

    // ---- Recorder (optional) ----
    let rec_tx = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(8192);
            tokio::spawn(recorder::run(rx, path));
            let _ = tx.try_send(Event::Note(format!("start venue_mode={}", args.venue_mode.label())));
            Some(tx)
        }
        None => None,
    };

    // ---- Venue ----
    match args.venue_mode {
        config::VenueMode::Mock => {
            let (md_tx, md_rx) = broadcast::channel::<BookSnapshot>(1024);
            tokio::spawn(gateway::run_venue(cmd_rx, ev_tx.clone(), md_rx, params.clone()));
            tokio::spawn(feed::run_mock(md_tx, ev_tx, params.tick_size, args.feed_interval_ms));
        }
        config::VenueMode::Ws => {
            tokio::spawn(venue_ws::run(args.venue_ws_url.clone(), ev_tx, cmd_rx));
        }
    }

    // ---- Trader (single consumer of venue events) ----
    let mut trader_task = tokio::spawn(trader::run(ev_rx, cmd_tx, params, rec_tx));

    // ---- Heartbeat ----
    let mut beat = interval(Duration::from_secs(5));
    loop {
        select! {
            _ = beat.tick() => {
                info!(
                    position = crate::metrics::POSITION.get(),
                    hedge_position = crate::metrics::HEDGE_POSITION.get(),
                    live_orders = crate::metrics::LIVE_ORDERS.get(),
                    fees = crate::metrics::FEES_TOTAL.get(),
                    "heartbeat"
                );
            },
            res = &mut trader_task => {
                if let Err(e) = res {
                    error!(?e, "trader task failed");
                }
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, shutting down");
                break;
            }
        }
    }
}
