// ===============================
// src/strategy.rs
// ===============================
//
// Quoting policy ETF vs future. Dievaluasi sekali per snapshot ETF;
// rule pertama yang guard-nya true menang, sisanya tidak dilihat.
//
// | # | rule             | guard                                          | action                                   |
// |---|------------------|------------------------------------------------|------------------------------------------|
// | 1 | aggressive_buy   | 0 < ask < max_aggressive_ask                   | cancel resting ask; FAK buy @ask         |
// | 2 | aggressive_sell  | bid > min_aggressive_bid                       | cancel resting bid; FAK sell @bid        |
// | 3 | improve_bid      | bid > 0, max_passive_bid > bid + tick          | requote bid @bid+tick if price changed   |
// | 4 | improve_ask      | ask > 0, min_passive_ask < ask - tick          | requote ask @ask-tick if price changed   |
// | 5 | fair_value       | always                                         | requote each side @rounded trigger       |
//
// Volume FAK = min(max_lot, volume di top level, room posisi - satu lot).
// Requote = cancel order resting di sisi itu; GFD baru di-insert setelah slot kosong
// (status cancel dari venue), jadi paling banyak satu resting per sisi.
// Trigger yang nol / negatif (snapshot future rusak) tidak pernah lolos guard.
//

use crate::domain::Side;
use crate::market::{TopOfBook, Triggers};
use crate::orders::RestingQuote;

/// Everything the policy reads for one decision.
#[derive(Debug, Clone, Copy)]
pub struct QuoteCtx {
    pub etf: TopOfBook,
    pub triggers: Triggers,
    pub bid: Option<RestingQuote>,
    pub ask: Option<RestingQuote>,
    pub buy_size: i64,
    pub sell_size: i64,
    pub buy_room: i64,
    pub sell_room: i64,
    pub max_lot: i64,
    pub tick: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Cancel the live resting order on this side, if any.
    CancelResting(Side),
    /// Fill-and-kill at the touch.
    Cross { side: Side, price: i64, volume: i64 },
    /// Cancel the resting order on this side and rest a new one once the side is free
    /// (insert skipped when volume is zero).
    Requote { side: Side, price: i64, volume: i64 },
}

pub struct Rule {
    pub name: &'static str,
    pub when: fn(&QuoteCtx) -> bool,
    pub then: fn(&QuoteCtx) -> Vec<Action>,
}

pub const RULES: [Rule; 5] = [
    Rule { name: "aggressive_buy", when: aggressive_buy_when, then: aggressive_buy_then },
    Rule { name: "aggressive_sell", when: aggressive_sell_when, then: aggressive_sell_then },
    Rule { name: "improve_bid", when: improve_bid_when, then: improve_bid_then },
    Rule { name: "improve_ask", when: improve_ask_when, then: improve_ask_then },
    Rule { name: "fair_value", when: |_| true, then: fair_value_then },
];

/// Run the table top to bottom; returns the winning rule name and its actions.
pub fn decide(ctx: &QuoteCtx) -> (&'static str, Vec<Action>) {
    for rule in RULES.iter() {
        if (rule.when)(ctx) {
            return (rule.name, (rule.then)(ctx));
        }
    }
    // fair_value guard is always true
    ("none", Vec::new())
}

fn resting_px(q: Option<RestingQuote>) -> Option<i64> { q.map(|q| q.price) }

fn aggressive_buy_when(c: &QuoteCtx) -> bool {
    c.etf.ask_price > 0 && c.triggers.max_aggressive_ask > 0.0 && (c.etf.ask_price as f64) < c.triggers.max_aggressive_ask
}

fn aggressive_buy_then(c: &QuoteCtx) -> Vec<Action> {
    let mut out = vec![Action::CancelResting(Side::Sell)];
    let volume = c.max_lot.min(c.etf.ask_volume).min(c.buy_room);
    if volume > 0 {
        out.push(Action::Cross { side: Side::Buy, price: c.etf.ask_price, volume });
    }
    out
}

fn aggressive_sell_when(c: &QuoteCtx) -> bool {
    c.triggers.min_aggressive_bid > 0.0 && (c.etf.bid_price as f64) > c.triggers.min_aggressive_bid
}

fn aggressive_sell_then(c: &QuoteCtx) -> Vec<Action> {
    let mut out = vec![Action::CancelResting(Side::Buy)];
    let volume = c.max_lot.min(c.etf.bid_volume).min(c.sell_room);
    if volume > 0 {
        out.push(Action::Cross { side: Side::Sell, price: c.etf.bid_price, volume });
    }
    out
}

fn improve_bid_when(c: &QuoteCtx) -> bool {
    c.etf.bid_price > 0 && c.triggers.max_passive_bid > (c.etf.bid_price + c.tick) as f64
}

fn improve_bid_then(c: &QuoteCtx) -> Vec<Action> {
    let price = c.etf.bid_price + c.tick;
    if resting_px(c.bid) == Some(price) {
        return Vec::new();
    }
    vec![Action::Requote { side: Side::Buy, price, volume: c.buy_size }]
}

fn improve_ask_when(c: &QuoteCtx) -> bool {
    let price = c.etf.ask_price - c.tick;
    c.etf.ask_price > 0 && c.triggers.min_passive_ask > 0.0 && c.triggers.min_passive_ask < price as f64
}

fn improve_ask_then(c: &QuoteCtx) -> Vec<Action> {
    let price = c.etf.ask_price - c.tick;
    if price <= 0 || resting_px(c.ask) == Some(price) {
        return Vec::new();
    }
    vec![Action::Requote { side: Side::Sell, price, volume: c.sell_size }]
}

// Ask dibulatkan ke atas, bid ke bawah (asimetri dipertahankan, lihat DESIGN.md).
fn fair_value_then(c: &QuoteCtx) -> Vec<Action> {
    let tick = c.tick as f64;
    let ask_px = ((c.triggers.min_passive_ask / tick).ceil() * tick) as i64;
    let bid_px = ((c.triggers.max_passive_bid / tick).floor() * tick) as i64;

    let mut out = Vec::new();
    if c.triggers.min_passive_ask > 0.0 && ask_px > 0 && resting_px(c.ask) != Some(ask_px) {
        out.push(Action::Requote { side: Side::Sell, price: ask_px, volume: c.sell_size });
    }
    if c.triggers.max_passive_bid > 0.0 && bid_px > 0 && resting_px(c.bid) != Some(bid_px) {
        out.push(Action::Requote { side: Side::Buy, price: bid_px, volume: c.buy_size });
    }
    out
}
