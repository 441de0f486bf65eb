// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : etf_mm_rust — ETF/future market-making & hedging engine in Rust
Module  : config.rs
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
use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use thiserror::Error;

/// Sumber event venue
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VenueMode {
    /// In-process exchange simulator + mock feed
    Mock,
    /// JSON over WebSocket
    Ws,
}

impl VenueMode {
    pub fn from_env(key: &str, default_mode: VenueMode) -> VenueMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "mock" => VenueMode::Mock,
            "ws" | "websocket" => VenueMode::Ws,
            _ => default_mode,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VenueMode::Mock => "mock",
            VenueMode::Ws => "ws",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Parse { key: &'static str, value: String },
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("taker fee {taker} is below maker fee {maker}")]
    FeeOrder { taker: f64, maker: f64 },
    #[error("maximum ask {max_ask} must exceed minimum bid {min_bid}")]
    PriceBounds { min_bid: i64, max_ask: i64 },
}

#[derive(Clone, Debug)]
pub struct Args {
    pub venue_mode: VenueMode,
    pub venue_ws_url: String,
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub feed_interval_ms: u64,
}

/// Trading constants, fixed for the life of the process.
#[derive(Clone, Debug, PartialEq)]
pub struct Params {
    pub position_limit: i64,
    pub order_lot: i64,
    pub tick_size: i64,
    pub taker_fee: f64,
    pub maker_fee: f64,
    pub max_lot: i64,
    pub minimum_bid: i64,
    pub maximum_ask: i64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            position_limit: 100,
            order_lot: 25,
            tick_size: 100,
            taker_fee: 0.0002,
            maker_fee: -0.0001,
            max_lot: 100,
            minimum_bid: 1,
            maximum_ask: 2_147_483_647,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("POSITION_LIMIT", self.position_limit),
            ("ORDER_LOT", self.order_lot),
            ("TICK_SIZE", self.tick_size),
            ("MAX_LOT", self.max_lot),
            ("MINIMUM_BID", self.minimum_bid),
        ] {
            if v <= 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.taker_fee < self.maker_fee {
            return Err(ConfigError::FeeOrder { taker: self.taker_fee, maker: self.maker_fee });
        }
        if self.maximum_ask <= self.minimum_bid {
            return Err(ConfigError::PriceBounds { min_bid: self.minimum_bid, max_ask: self.maximum_ask });
        }
        Ok(())
    }

    /// Lowest bid on the tick grid the venue accepts; sell hedges go here.
    pub fn min_bid_nearest_tick(&self) -> i64 {
        (self.minimum_bid + self.tick_size) / self.tick_size * self.tick_size
    }

    /// Highest ask on the tick grid the venue accepts; buy hedges go here.
    pub fn max_ask_nearest_tick(&self) -> i64 {
        self.maximum_ask / self.tick_size * self.tick_size
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { key, value: raw }),
        _ => Ok(default),
    }
}

pub fn load() -> Result<(Args, Params), ConfigError> {
    // Pastikan .env dibaca (agar RECORD_FILE, VENUE_MODE, dll ter-load)
    let _ = dotenv();

    let venue_mode = VenueMode::from_env("VENUE_MODE", VenueMode::Mock);
    let venue_ws_url = env::var("VENUE_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:12345/venue".to_string());
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.is_empty());

    let args = Args {
        venue_mode,
        venue_ws_url,
        record_file,
        metrics_port: env_or("METRICS_PORT", 9898)?,
        feed_interval_ms: env_or("FEED_INTERVAL_MS", 50)?,
    };

    // ===== Trading constants =====
    let d = Params::default();
    let params = Params {
        position_limit: env_or("POSITION_LIMIT", d.position_limit)?,
        order_lot: env_or("ORDER_LOT", d.order_lot)?,
        tick_size: env_or("TICK_SIZE", d.tick_size)?,
        taker_fee: env_or("TAKER_FEE", d.taker_fee)?,
        maker_fee: env_or("MAKER_FEE", d.maker_fee)?,
        max_lot: env_or("MAX_LOT", d.max_lot)?,
        minimum_bid: env_or("MINIMUM_BID", d.minimum_bid)?,
        maximum_ask: env_or("MAXIMUM_ASK", d.maximum_ask)?,
    };
    params.validate()?;

    Ok((args, params))
}
