// ===============================
// src/market.rs (reference future -> trigger prices)
// ===============================
use crate::domain::BookSnapshot;

/// Best level of one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopOfBook {
    pub bid_price: i64,
    pub bid_volume: i64,
    pub ask_price: i64,
    pub ask_volume: i64,
}

impl From<&BookSnapshot> for TopOfBook {
    fn from(s: &BookSnapshot) -> Self {
        Self {
            bid_price: s.bid_prices[0],
            bid_volume: s.bid_volumes[0],
            ask_price: s.ask_prices[0],
            ask_volume: s.ask_volumes[0],
        }
    }
}

/// Fee-adjusted thresholds derived from the future's best bid/ask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triggers {
    /// Buy the ETF aggressively only below this.
    pub max_aggressive_ask: f64,
    /// Rest a bid only below this.
    pub max_passive_bid: f64,
    /// Sell the ETF aggressively only above this.
    pub min_aggressive_bid: f64,
    /// Rest an ask only above this.
    pub min_passive_ask: f64,
}

impl Triggers {
    pub fn from_future(bid: i64, ask: i64, taker_fee: f64, maker_fee: f64) -> Self {
        let bid = bid as f64;
        let ask = ask as f64;
        Self {
            max_aggressive_ask: bid * (1.0 + taker_fee),
            max_passive_bid: bid * (1.0 + maker_fee),
            min_aggressive_bid: ask * (1.0 + taker_fee),
            min_passive_ask: ask * (1.0 + maker_fee),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketState {
    taker_fee: f64,
    maker_fee: f64,
    future: Option<TopOfBook>,
    triggers: Option<Triggers>,
}

impl MarketState {
    pub fn new(taker_fee: f64, maker_fee: f64) -> Self {
        Self { taker_fee, maker_fee, future: None, triggers: None }
    }

    /// Overwrite the future's top of book and recompute all four triggers together.
    /// Non-positive prices are stored as-is; the quoting guards reject them later.
    pub fn on_future(&mut self, snap: &BookSnapshot) -> Triggers {
        let top = TopOfBook::from(snap);
        let t = Triggers::from_future(top.bid_price, top.ask_price, self.taker_fee, self.maker_fee);
        self.future = Some(top);
        self.triggers = Some(t);
        t
    }

    pub fn triggers(&self) -> Option<Triggers> { self.triggers }
    pub fn future(&self) -> Option<TopOfBook> { self.future }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Instrument;

    fn close(a: f64, b: f64) -> bool { (a - b).abs() < 1e-9 }

    #[test]
    fn triggers_follow_fee_formulas() {
        let mut m = MarketState::new(0.0002, -0.0001);
        assert!(m.triggers().is_none());

        let t = m.on_future(&BookSnapshot::top(Instrument::Future, 1, (9_900, 12), (10_000, 7)));
        assert!(close(t.max_aggressive_ask, 9_901.98));
        assert!(close(t.max_passive_bid, 9_899.01));
        assert!(close(t.min_aggressive_bid, 10_002.0));
        assert!(close(t.min_passive_ask, 9_999.0));

        let fut = m.future().unwrap();
        assert_eq!((fut.bid_volume, fut.ask_volume), (12, 7));
    }

    #[test]
    fn later_snapshot_replaces_all_triggers() {
        let mut m = MarketState::new(0.0002, -0.0001);
        m.on_future(&BookSnapshot::top(Instrument::Future, 1, (9_900, 1), (10_000, 1)));
        m.on_future(&BookSnapshot::top(Instrument::Future, 2, (0, 0), (0, 0)));
        let t = m.triggers().unwrap();
        assert_eq!(t, Triggers::from_future(0, 0, 0.0002, -0.0001));
        assert_eq!(t.max_passive_bid, 0.0);
    }
}
