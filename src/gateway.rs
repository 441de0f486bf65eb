// ===============================
// src/gateway.rs (mock venue / exchange simulator)
// ===============================
//
// Simulator lokal untuk VENUE_MODE=mock:
// - FAK: match langsung ke top-of-book ETF terakhir, sisa dibatalkan
// - GFD: resting, terisi saat book ETF menyilang harga order
// - Cancel: status remaining=0 (cancel id yang tidak dikenal diabaikan)
// - Hedge: terisi di top-of-book future
//
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::Params;
use crate::domain::{BookSnapshot, Command, Instrument, Lifespan, OrderId, Side, VenueEvent};
use crate::market::TopOfBook;
use crate::metrics::VENUE_EXECS;

#[derive(Debug, Clone)]
struct SimOrder { side: Side, price: i64, remaining: i64, filled: i64, fees: i64 }

pub struct Simulator {
    params: Params,
    etf: Option<TopOfBook>,
    future: Option<TopOfBook>,
    resting: HashMap<OrderId, SimOrder>,
    seen: HashSet<OrderId>,
}

impl Simulator {
    pub fn new(params: Params) -> Self {
        Self { params, etf: None, future: None, resting: HashMap::new(), seen: HashSet::new() }
    }

    fn fee(&self, price: i64, volume: i64, rate: f64) -> i64 {
        ((price * volume) as f64 * rate).round() as i64
    }

    fn reject(id: OrderId, message: &str) -> VenueEvent {
        VENUE_EXECS.with_label_values(&["rejected"]).inc();
        VenueEvent::Error { id, message: message.to_string() }
    }

    pub fn on_command(&mut self, cmd: Command) -> Vec<VenueEvent> {
        match cmd {
            Command::Insert { id, side, price, volume, lifespan } => self.insert(id, side, price, volume, lifespan),
            Command::Cancel { id } => match self.resting.remove(&id) {
                Some(o) => {
                    VENUE_EXECS.with_label_values(&["cancelled"]).inc();
                    vec![VenueEvent::OrderStatus { id, fill_volume: o.filled, remaining_volume: 0, fees: o.fees }]
                }
                None => Vec::new(),
            },
            Command::Hedge { id, side, price, volume } => self.hedge(id, side, price, volume),
        }
    }

    fn validate(&self, id: OrderId, price: i64, volume: i64) -> Result<(), &'static str> {
        if self.seen.contains(&id) {
            return Err("duplicate order id");
        }
        if volume <= 0 {
            return Err("volume must be positive");
        }
        if price < self.params.minimum_bid || price > self.params.maximum_ask {
            return Err("price out of range");
        }
        if price % self.params.tick_size != 0 {
            return Err("price not a multiple of tick size");
        }
        Ok(())
    }

    fn insert(&mut self, id: OrderId, side: Side, price: i64, volume: i64, lifespan: Lifespan) -> Vec<VenueEvent> {
        if let Err(msg) = self.validate(id, price, volume) {
            return vec![Self::reject(id, msg)];
        }
        self.seen.insert(id);

        match lifespan {
            Lifespan::FillAndKill => {
                let (touch, avail) = match (side, self.etf) {
                    (Side::Buy, Some(b)) if b.ask_price > 0 && price >= b.ask_price => (b.ask_price, b.ask_volume),
                    (Side::Sell, Some(b)) if b.bid_price > 0 && price <= b.bid_price => (b.bid_price, b.bid_volume),
                    _ => (price, 0),
                };
                let fill = volume.min(avail).max(0);
                let mut out = Vec::new();
                let mut fees = 0;
                if fill > 0 {
                    fees = self.fee(touch, fill, self.params.taker_fee);
                    out.push(VenueEvent::OrderFilled { id, price: touch, volume: fill });
                    VENUE_EXECS.with_label_values(&["filled"]).inc();
                }
                out.push(VenueEvent::OrderStatus { id, fill_volume: fill, remaining_volume: 0, fees });
                out
            }
            Lifespan::GoodForDay => {
                self.resting.insert(id, SimOrder { side, price, remaining: volume, filled: 0, fees: 0 });
                VENUE_EXECS.with_label_values(&["ack"]).inc();
                vec![VenueEvent::OrderStatus { id, fill_volume: 0, remaining_volume: volume, fees: 0 }]
            }
        }
    }

    fn hedge(&mut self, id: OrderId, side: Side, price: i64, volume: i64) -> Vec<VenueEvent> {
        if volume <= 0 {
            return vec![Self::reject(id, "volume must be positive")];
        }
        let touch = match (side, self.future) {
            (Side::Sell, Some(f)) if f.bid_price > 0 && price <= f.bid_price => f.bid_price,
            (Side::Buy, Some(f)) if f.ask_price > 0 && price >= f.ask_price => f.ask_price,
            _ => return vec![Self::reject(id, "hedge not marketable")],
        };
        VENUE_EXECS.with_label_values(&["hedged"]).inc();
        vec![VenueEvent::HedgeFilled { id, price: touch, volume }]
    }

    /// New book: store it; an ETF book fills any resting order it crosses.
    pub fn on_book(&mut self, snap: &BookSnapshot) -> Vec<VenueEvent> {
        let top = TopOfBook::from(snap);
        match snap.instrument {
            Instrument::Future => {
                self.future = Some(top);
                return Vec::new();
            }
            Instrument::Etf => self.etf = Some(top),
        }

        let mut bid_avail = top.bid_volume;
        let mut ask_avail = top.ask_volume;
        let mut ids: Vec<OrderId> = self.resting.keys().copied().collect();
        ids.sort_unstable();

        let mut out = Vec::new();
        for id in ids {
            let Some(o) = self.resting.get(&id).cloned() else { continue };
            let avail = match o.side {
                Side::Buy if top.ask_price > 0 && o.price >= top.ask_price => &mut ask_avail,
                Side::Sell if top.bid_price > 0 && o.price <= top.bid_price => &mut bid_avail,
                _ => continue,
            };
            let fill = o.remaining.min(*avail);
            if fill <= 0 {
                continue;
            }
            *avail -= fill;
            let fees = o.fees + self.fee(o.price, fill, self.params.maker_fee);
            let remaining = o.remaining - fill;
            let filled = o.filled + fill;
            out.push(VenueEvent::OrderFilled { id, price: o.price, volume: fill });
            out.push(VenueEvent::OrderStatus { id, fill_volume: filled, remaining_volume: remaining, fees });
            VENUE_EXECS.with_label_values(&["filled"]).inc();
            if remaining == 0 {
                self.resting.remove(&id);
            } else if let Some(live) = self.resting.get_mut(&id) {
                live.remaining = remaining;
                live.filled = filled;
                live.fees = fees;
            }
        }
        out
    }
}

pub async fn run_venue(
    mut cmd_rx: mpsc::Receiver<Command>,
    ev_tx: mpsc::Sender<VenueEvent>,
    mut md_rx: broadcast::Receiver<BookSnapshot>,
    params: Params,
) {
    let mut sim = Simulator::new(params);
    info!("mock venue: started");
    loop {
        let events = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(c) => sim.on_command(c),
                None => break,
            },
            md = md_rx.recv() => match md {
                Ok(s) => sim.on_book(&s),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "mock venue lagging behind market data");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        for ev in events {
            if ev_tx.send(ev).await.is_err() {
                info!("mock venue: event channel closed");
                return;
            }
        }
    }
    info!("mock venue: stopped");
}
