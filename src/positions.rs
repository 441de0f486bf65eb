// ===============================
// src/positions.rs (inventory, hedge sizing & quote sizing)
// ===============================

use crate::config::Params;
use crate::domain::Side;
use crate::metrics::{HEDGE_POSITION, POSITION};

/// Hedge order the controller wants on the future after a fill (id allocated by the caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HedgeIntent { pub side: Side, pub price: i64, pub volume: i64 }

#[derive(Debug)]
pub struct PositionController {
    position_limit: i64,
    order_lot: i64,
    hedge_bid_px: i64,
    hedge_ask_px: i64,
    position: i64,
    hedge_position: i64,
    buy_size: i64,
    sell_size: i64,
}

impl PositionController {
    pub fn new(p: &Params) -> Self {
        let mut c = Self {
            position_limit: p.position_limit,
            order_lot: p.order_lot,
            hedge_bid_px: p.min_bid_nearest_tick(),
            hedge_ask_px: p.max_ask_nearest_tick(),
            position: 0,
            hedge_position: 0,
            buy_size: 0,
            sell_size: 0,
        };
        c.resize();
        c
    }

    /// Book a fill of one of our ETF orders and return the offsetting future hedge.
    /// Non-positive volumes change nothing.
    pub fn on_fill(&mut self, side: Side, volume: i64) -> Option<HedgeIntent> {
        if volume <= 0 {
            return None;
        }
        self.position += side.sign() * volume;
        self.resize();
        POSITION.set(self.position);

        // jual future di harga berapa pun (atau beli) -> marketable
        let hedge_side = side.opposite();
        let price = match hedge_side {
            Side::Sell => self.hedge_bid_px,
            Side::Buy => self.hedge_ask_px,
        };
        Some(HedgeIntent { side: hedge_side, price, volume })
    }

    /// Hedge fills are reported without a side; the caller looks it up from the hedge it sent.
    pub fn on_hedge_fill(&mut self, side: Side, volume: i64) {
        self.hedge_position += side.sign() * volume;
        HEDGE_POSITION.set(self.hedge_position);
    }

    fn resize(&mut self) {
        self.buy_size = self.order_lot.min(self.position_limit - self.position).max(0);
        self.sell_size = self.order_lot.min(self.position_limit + self.position).max(0);
    }

    pub fn position(&self) -> i64 { self.position }
    pub fn hedge_position(&self) -> i64 { self.hedge_position }

    /// Volume for a new resting bid. `in_flight` is buy volume already sent but not yet
    /// reported done; it counts against the limit as if it had filled.
    pub fn bid_size(&self, in_flight: i64) -> i64 {
        self.buy_size.min(self.position_limit - self.position - in_flight).max(0)
    }
    pub fn ask_size(&self, in_flight: i64) -> i64 {
        self.sell_size.min(self.position_limit + self.position - in_flight).max(0)
    }

    /// Room for an aggressive buy, keeping one lot of headroom for the resting bid.
    pub fn aggressive_buy_room(&self, in_flight: i64) -> i64 {
        self.position_limit - self.position - in_flight - self.order_lot
    }
    pub fn aggressive_sell_room(&self, in_flight: i64) -> i64 {
        self.position_limit + self.position - in_flight - self.order_lot
    }
}
