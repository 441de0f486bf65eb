// ===============================
// src/feed.rs
// ===============================
//
// Market data mock untuk VENUE_MODE=mock:
// - future: random walk di grid tick
// - ETF   : future mid + noise beberapa tick (korelasi tinggi)
// - tiap snapshot dikirim ke simulator (broadcast) dan ke trader (mpsc)
// - trade ticks sesekali, informational saja
//
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::domain::{BookSnapshot, Instrument, VenueEvent, BOOK_DEPTH};

/// Five-level ladder around the given best bid/ask, one tick apart.
pub fn ladder<R: Rng>(rng: &mut R, instrument: Instrument, sequence: u64, best_bid: i64, best_ask: i64, tick: i64) -> BookSnapshot {
    let mut s = BookSnapshot::top(instrument, sequence, (0, 0), (0, 0));
    for lvl in 0..BOOK_DEPTH {
        let bid = best_bid - tick * lvl as i64;
        if bid > 0 {
            s.bid_prices[lvl] = bid;
            s.bid_volumes[lvl] = rng.gen_range(1..=100);
        }
        s.ask_prices[lvl] = best_ask + tick * lvl as i64;
        s.ask_volumes[lvl] = rng.gen_range(1..=100);
    }
    s
}

/// Mock generator. Stops when the trader side of the channel goes away.
pub async fn run_mock(
    md_tx: broadcast::Sender<BookSnapshot>,
    ev_tx: mpsc::Sender<VenueEvent>,
    tick: i64,
    every_ms: u64,
) {
    let mut rng = StdRng::from_entropy();
    let mut fut_mid: i64 = 1_000 * tick;
    let mut seq: u64 = 0;

    let mut timer = interval(Duration::from_millis(every_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(every_ms, "mock feed: started");

    loop {
        timer.tick().await;
        seq += 1;

        fut_mid = (fut_mid + tick * rng.gen_range(-1..=1)).max(10 * tick);
        let fut = ladder(&mut rng, Instrument::Future, seq, fut_mid - tick, fut_mid + tick, tick);

        let etf_mid = fut_mid + tick * rng.gen_range(-3..=3);
        let half = tick * rng.gen_range(1..=2);
        let etf = ladder(&mut rng, Instrument::Etf, seq, etf_mid - half, etf_mid + half, tick);

        let mut batch = vec![fut, etf];
        if seq % 10 == 0 {
            let ticks = batch[1].clone();
            batch.push(ticks);
        }

        for (i, snap) in batch.into_iter().enumerate() {
            // simulator lihat book dulu sebelum trader bereaksi
            let ev = if i < 2 {
                let _ = md_tx.send(snap.clone());
                VenueEvent::OrderBook(snap)
            } else {
                VenueEvent::TradeTicks(snap)
            };
            if ev_tx.send(ev).await.is_err() {
                warn!("mock feed: event channel closed, stopping");
                return;
            }
        }
    }
}
