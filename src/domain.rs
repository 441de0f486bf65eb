// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

pub type OrderId = u64;

/// Jumlah level harga per sisi pada snapshot venue
pub const BOOK_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument { Future, Etf }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side { Buy, Sell }
impl Side {
    pub fn sign(&self) -> i64 { match self { Side::Buy => 1, Side::Sell => -1 } }
    pub fn opposite(&self) -> Side { match self { Side::Buy => Side::Sell, Side::Sell => Side::Buy } }
    pub fn label(&self) -> &'static str { match self { Side::Buy => "buy", Side::Sell => "sell" } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifespan { GoodForDay, FillAndKill }
impl Lifespan {
    pub fn label(&self) -> &'static str { match self { Lifespan::GoodForDay => "gfd", Lifespan::FillAndKill => "fak" } }
}

/// Five-level book (or trade-tick) snapshot. Level 0 is the best price; missing levels are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument: Instrument,
    pub sequence: u64,
    pub ask_prices: [i64; BOOK_DEPTH],
    pub ask_volumes: [i64; BOOK_DEPTH],
    pub bid_prices: [i64; BOOK_DEPTH],
    pub bid_volumes: [i64; BOOK_DEPTH],
}

impl BookSnapshot {
    /// Snapshot with only the top level populated.
    pub fn top(instrument: Instrument, sequence: u64, bid: (i64, i64), ask: (i64, i64)) -> Self {
        let mut s = Self {
            instrument,
            sequence,
            ask_prices: [0; BOOK_DEPTH],
            ask_volumes: [0; BOOK_DEPTH],
            bid_prices: [0; BOOK_DEPTH],
            bid_volumes: [0; BOOK_DEPTH],
        };
        s.bid_prices[0] = bid.0;
        s.bid_volumes[0] = bid.1;
        s.ask_prices[0] = ask.0;
        s.ask_volumes[0] = ask.1;
        s
    }
}

/// Inbound notifications from the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueEvent {
    OrderBook(BookSnapshot),
    TradeTicks(BookSnapshot),
    OrderFilled { id: OrderId, price: i64, volume: i64 },
    HedgeFilled { id: OrderId, price: i64, volume: i64 },
    OrderStatus { id: OrderId, fill_volume: i64, remaining_volume: i64, fees: i64 },
    Error { id: OrderId, message: String },
}

/// Outbound order-management commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Insert { id: OrderId, side: Side, price: i64, volume: i64, lifespan: Lifespan },
    Cancel { id: OrderId },
    Hedge { id: OrderId, side: Side, price: i64, volume: i64 },
}

// Recorder line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Venue { ts_ns: i128, event: VenueEvent }, Cmd { ts_ns: i128, command: Command }, Note(String) }
