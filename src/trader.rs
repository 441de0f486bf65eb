// ===============================
// src/trader.rs (event handlers -> commands)
// ===============================
//
// AutoTrader memegang seluruh state (trigger, slot resting, posisi, registry).
// Event diproses satu per satu sampai selesai; tidak ada lock.
//
use ahash::AHashMap as HashMap;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Params;
use crate::domain::{BookSnapshot, Command, Event, Instrument, Lifespan, OrderId, Side, VenueEvent};
use crate::lifecycle::{self, Outcome};
use crate::market::{MarketState, TopOfBook};
use crate::metrics::{
    BOOK_UPDATES, CANCELS, FEES_TOTAL, FILLED_VOLUME, FUTURE_TOP_VOLUME, HEDGES, LIVE_ORDERS, ORDERS_INSERTED,
    POLICY_DECISIONS, RESTING_PX, SINK_DROPPED, TRADE_TICKS, TRIGGER_PX, VENUE_ERRORS,
};
use crate::orders::{OrderBook, OrderIds};
use crate::positions::{HedgeIntent, PositionController};
use crate::strategy::{self, Action, QuoteCtx};

/// Where outbound commands go.
pub trait OrderSink {
    fn send(&mut self, cmd: Command);
}

impl OrderSink for Vec<Command> {
    fn send(&mut self, cmd: Command) { self.push(cmd); }
}

/// Bounded channel to the venue task, optionally mirrored to the recorder.
pub struct ChannelSink {
    pub tx: mpsc::Sender<Command>,
    pub rec_tx: Option<mpsc::Sender<Event>>,
}

impl OrderSink for ChannelSink {
    fn send(&mut self, cmd: Command) {
        if let Some(rec) = &self.rec_tx {
            let _ = rec.try_send(Event::Cmd { ts_ns: now_ns(), command: cmd.clone() });
        }
        if let Err(e) = self.tx.try_send(cmd) {
            warn!(?e, "command channel full/closed, dropping command");
            SINK_DROPPED.inc();
        }
    }
}

fn now_ns() -> i128 { Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128 }

/// Callbacks the venue transport drives, one event at a time.
pub trait VenueHandler {
    fn on_order_book(&mut self, snap: &BookSnapshot);
    fn on_trade_ticks(&mut self, snap: &BookSnapshot);
    fn on_order_filled(&mut self, id: OrderId, price: i64, volume: i64);
    fn on_hedge_filled(&mut self, id: OrderId, price: i64, volume: i64);
    fn on_order_status(&mut self, id: OrderId, fill_volume: i64, remaining_volume: i64, fees: i64);
    fn on_error(&mut self, id: OrderId, message: &str);

    fn dispatch(&mut self, ev: &VenueEvent) {
        match ev {
            VenueEvent::OrderBook(s) => self.on_order_book(s),
            VenueEvent::TradeTicks(s) => self.on_trade_ticks(s),
            VenueEvent::OrderFilled { id, price, volume } => self.on_order_filled(*id, *price, *volume),
            VenueEvent::HedgeFilled { id, price, volume } => self.on_hedge_filled(*id, *price, *volume),
            VenueEvent::OrderStatus { id, fill_volume, remaining_volume, fees } => {
                self.on_order_status(*id, *fill_volume, *remaining_volume, *fees)
            }
            VenueEvent::Error { id, message } => self.on_error(*id, message),
        }
    }
}

/// Outstanding hedge: side sent and volume not yet reported filled.
#[derive(Debug, Clone, Copy)]
struct PendingHedge { side: Side, remaining: i64 }

pub struct AutoTrader<S: OrderSink> {
    params: Params,
    sink: S,
    ids: OrderIds,
    market: MarketState,
    book: OrderBook,
    inventory: PositionController,
    hedges: HashMap<OrderId, PendingHedge>,
    fees: i64,
}

impl<S: OrderSink> AutoTrader<S> {
    pub fn new(params: Params, sink: S) -> Self {
        Self {
            market: MarketState::new(params.taker_fee, params.maker_fee),
            inventory: PositionController::new(&params),
            params,
            sink,
            ids: OrderIds::default(),
            book: OrderBook::default(),
            hedges: HashMap::new(),
            fees: 0,
        }
    }

    pub fn position(&self) -> i64 { self.inventory.position() }
    pub fn hedge_position(&self) -> i64 { self.inventory.hedge_position() }
    pub fn fees(&self) -> i64 { self.fees }
    pub fn book(&self) -> &OrderBook { &self.book }
    pub fn sink(&self) -> &S { &self.sink }
    pub fn sink_mut(&mut self) -> &mut S { &mut self.sink }

    fn quote(&mut self, etf: TopOfBook) {
        let Some(triggers) = self.market.triggers() else {
            debug!("no future snapshot yet, not quoting");
            return;
        };
        // FAK yang belum selesai dihitung seolah sudah fill; slot resting dijaga satu lot
        let fak_buy = self.book.aggressive_unfilled(Side::Buy);
        let fak_sell = self.book.aggressive_unfilled(Side::Sell);
        let ctx = QuoteCtx {
            etf,
            triggers,
            bid: self.book.resting(Side::Buy),
            ask: self.book.resting(Side::Sell),
            buy_size: self.inventory.bid_size(fak_buy),
            sell_size: self.inventory.ask_size(fak_sell),
            buy_room: self.inventory.aggressive_buy_room(fak_buy),
            sell_room: self.inventory.aggressive_sell_room(fak_sell),
            max_lot: self.params.max_lot,
            tick: self.params.tick_size,
        };
        let (rule, actions) = strategy::decide(&ctx);
        POLICY_DECISIONS.with_label_values(&[rule]).inc();
        if !actions.is_empty() {
            debug!(rule, ?actions, "policy decision");
        }
        for a in actions {
            match a {
                Action::CancelResting(side) => self.cancel_resting(side),
                Action::Cross { side, price, volume } => self.insert(side, price, volume, Lifespan::FillAndKill),
                Action::Requote { side, price, volume } => {
                    // quote lama masih hidup sampai venue konfirmasi cancel; order baru menunggu slot kosong
                    if self.book.resting(side).is_some() {
                        self.cancel_resting(side);
                        continue;
                    }
                    if volume > 0 && price > 0 {
                        self.insert(side, price, volume, Lifespan::GoodForDay);
                    }
                }
            }
        }
        self.publish_book_metrics();
    }

    fn insert(&mut self, side: Side, price: i64, volume: i64, lifespan: Lifespan) {
        let id = self.ids.next_id();
        self.sink.send(Command::Insert { id, side, price, volume, lifespan });
        self.book.register(id, side, price, volume, lifespan);
        ORDERS_INSERTED.with_label_values(&[side.label(), lifespan.label()]).inc();
        info!(id, side = side.label(), price, volume, lifespan = lifespan.label(), "insert");
    }

    fn cancel_resting(&mut self, side: Side) {
        if let Some(id) = self.book.take_cancel(side) {
            self.sink.send(Command::Cancel { id });
            CANCELS.inc();
            info!(id, side = side.label(), "cancel");
        }
    }

    fn hedge(&mut self, h: HedgeIntent) {
        let id = self.ids.next_id();
        self.sink.send(Command::Hedge { id, side: h.side, price: h.price, volume: h.volume });
        self.hedges.insert(id, PendingHedge { side: h.side, remaining: h.volume });
        HEDGES.with_label_values(&[h.side.label()]).inc();
        info!(id, side = h.side.label(), price = h.price, volume = h.volume, "hedge");
    }

    fn publish_book_metrics(&self) {
        for side in [Side::Buy, Side::Sell] {
            let px = self.book.resting(side).map(|q| q.price).unwrap_or(0);
            RESTING_PX.with_label_values(&[side.label()]).set(px);
        }
        LIVE_ORDERS.set(self.book.len() as i64);
    }
}

impl<S: OrderSink> VenueHandler for AutoTrader<S> {
    fn on_order_book(&mut self, snap: &BookSnapshot) {
        debug!(instrument = ?snap.instrument, sequence = snap.sequence, "order book");
        match snap.instrument {
            Instrument::Future => {
                BOOK_UPDATES.with_label_values(&["future"]).inc();
                let t = self.market.on_future(snap);
                TRIGGER_PX.with_label_values(&["max_aggressive_ask"]).set(t.max_aggressive_ask);
                TRIGGER_PX.with_label_values(&["max_passive_bid"]).set(t.max_passive_bid);
                TRIGGER_PX.with_label_values(&["min_aggressive_bid"]).set(t.min_aggressive_bid);
                TRIGGER_PX.with_label_values(&["min_passive_ask"]).set(t.min_passive_ask);
                if let Some(f) = self.market.future() {
                    FUTURE_TOP_VOLUME.with_label_values(&["bid"]).set(f.bid_volume);
                    FUTURE_TOP_VOLUME.with_label_values(&["ask"]).set(f.ask_volume);
                }
            }
            Instrument::Etf => {
                BOOK_UPDATES.with_label_values(&["etf"]).inc();
                self.quote(TopOfBook::from(snap));
            }
        }
    }

    fn on_trade_ticks(&mut self, snap: &BookSnapshot) {
        let label = match snap.instrument {
            Instrument::Future => "future",
            Instrument::Etf => "etf",
        };
        TRADE_TICKS.with_label_values(&[label]).inc();
        debug!(instrument = label, sequence = snap.sequence, "trade ticks");
    }

    fn on_order_filled(&mut self, id: OrderId, price: i64, volume: i64) {
        info!(id, price, volume, "order filled");
        let Some((tag, applied)) = self.book.record_fill(id, volume) else {
            debug!(id, "fill for untracked order ignored");
            return;
        };
        if applied < volume {
            warn!(id, volume, applied, "fill exceeds unfilled volume, capped");
        }
        let side = tag.side();
        FILLED_VOLUME.with_label_values(&[side.label()]).inc_by(applied.max(0) as u64);
        if let Some(h) = self.inventory.on_fill(side, applied) {
            self.hedge(h);
        }
    }

    fn on_hedge_filled(&mut self, id: OrderId, price: i64, volume: i64) {
        info!(id, price, volume, "hedge filled");
        let Some(pending) = self.hedges.get_mut(&id) else {
            warn!(id, "fill for unknown hedge");
            return;
        };
        let applied = volume.min(pending.remaining).max(0);
        pending.remaining -= applied;
        let side = pending.side;
        if pending.remaining <= 0 {
            self.hedges.remove(&id);
        }
        self.inventory.on_hedge_fill(side, applied);
    }

    fn on_order_status(&mut self, id: OrderId, fill_volume: i64, remaining_volume: i64, fees: i64) {
        info!(id, fill_volume, remaining_volume, fees, "order status");
        self.fees += self.book.record_fees(id, fees);
        FEES_TOTAL.set(self.fees);
        match lifecycle::resolve_status(&mut self.book, id, fill_volume, remaining_volume) {
            Outcome::Retired { tag, filled } => debug!(id, ?tag, filled, "retired"),
            Outcome::Working => {}
            Outcome::Untracked => debug!(id, "status for untracked order"),
        }
        self.publish_book_metrics();
    }

    fn on_error(&mut self, id: OrderId, message: &str) {
        warn!(id, %message, "venue error");
        if let Some(h) = self.hedges.remove(&id) {
            VENUE_ERRORS.with_label_values(&["hedge"]).inc();
            warn!(id, side = h.side.label(), unfilled = h.remaining, %message, "hedge rejected");
            return;
        }
        match lifecycle::error_as_status(&self.book, id, message) {
            Some(ev) => {
                VENUE_ERRORS.with_label_values(&["tracked"]).inc();
                self.dispatch(&ev);
            }
            None => VENUE_ERRORS.with_label_values(&["untracked"]).inc(),
        }
    }
}

/// Single consumer: drains venue events in arrival order until the channel closes.
pub async fn run(
    mut ev_rx: mpsc::Receiver<VenueEvent>,
    cmd_tx: mpsc::Sender<Command>,
    params: Params,
    rec_tx: Option<mpsc::Sender<Event>>,
) -> AutoTrader<ChannelSink> {
    let sink = ChannelSink { tx: cmd_tx, rec_tx: rec_tx.clone() };
    let mut trader = AutoTrader::new(params, sink);
    info!("trader: started");
    while let Some(ev) = ev_rx.recv().await {
        if let Some(rec) = &rec_tx {
            let _ = rec.try_send(Event::Venue { ts_ns: now_ns(), event: ev.clone() });
        }
        trader.dispatch(&ev);
    }
    info!(position = trader.position(), hedge_position = trader.hedge_position(), fees = trader.fees(), "trader: event channel closed");
    trader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderTag;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;

    fn trader() -> AutoTrader<Vec<Command>> { AutoTrader::new(Params::default(), Vec::new()) }

    fn future(t: &mut AutoTrader<Vec<Command>>, bid: i64, ask: i64) {
        t.on_order_book(&BookSnapshot::top(Instrument::Future, 1, (bid, 50), (ask, 50)));
    }

    fn etf(t: &mut AutoTrader<Vec<Command>>, bid: (i64, i64), ask: (i64, i64)) -> Vec<Command> {
        t.on_order_book(&BookSnapshot::top(Instrument::Etf, 1, bid, ask));
        std::mem::take(t.sink_mut())
    }

    #[test]
    fn cheap_etf_is_bought_with_fill_and_kill() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        let cmds = etf(&mut t, (9_700, 10), (9_800, 10));
        assert_eq!(
            cmds,
            vec![Command::Insert { id: 1, side: Side::Buy, price: 9_800, volume: 10, lifespan: Lifespan::FillAndKill }]
        );
        assert_eq!(t.book().ids_tagged(OrderTag::AggressiveBid), vec![1]);
    }

    #[test]
    fn nothing_is_quoted_before_the_future_arrives() {
        let mut t = trader();
        assert!(etf(&mut t, (9_700, 10), (9_800, 10)).is_empty());
    }

    #[test]
    fn aggressive_buy_cancels_resting_ask_once() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        let first = etf(&mut t, (9_800, 10), (10_000, 10));
        assert_eq!(first.len(), 2);
        let ask_id = t.book().resting(Side::Sell).unwrap().id;

        let cmds = etf(&mut t, (9_700, 10), (9_800, 10));
        assert_eq!(cmds[0], Command::Cancel { id: ask_id });
        assert!(matches!(cmds[1], Command::Insert { side: Side::Buy, lifespan: Lifespan::FillAndKill, .. }));

        // cancel still unconfirmed: no second cancel for the same id
        let again = etf(&mut t, (9_700, 10), (9_800, 10));
        assert!(!again.contains(&Command::Cancel { id: ask_id }));
    }

    #[test]
    fn buy_fill_produces_equal_sell_hedge() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_700, 10), (9_800, 10));
        t.on_order_filled(1, 9_800, 6);
        assert_eq!(t.position(), 6);
        assert_eq!(
            std::mem::take(t.sink_mut()),
            vec![Command::Hedge { id: 2, side: Side::Sell, price: 100, volume: 6 }]
        );
        t.on_hedge_filled(2, 9_890, 6);
        assert_eq!(t.hedge_position(), -6);
    }

    #[test]
    fn no_buying_at_the_position_limit() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        let cmds = etf(&mut t, (9_700, 100), (9_800, 100));
        assert_eq!(cmds, vec![Command::Insert { id: 1, side: Side::Buy, price: 9_800, volume: 75, lifespan: Lifespan::FillAndKill }]);
        t.on_order_filled(1, 9_800, 75);
        t.on_order_status(1, 75, 0, 15);

        let cmds = etf(&mut t, (9_700, 10), (10_100, 10));
        let bid_id = match cmds.last() {
            Some(Command::Insert { id, side: Side::Buy, price: 9_800, volume: 25, lifespan: Lifespan::GoodForDay }) => *id,
            other => panic!("expected resting bid, got {other:?}"),
        };
        t.on_order_filled(bid_id, 9_800, 25);
        t.on_order_status(bid_id, 25, 0, -2);
        assert_eq!(t.position(), 100);
        std::mem::take(t.sink_mut());

        for (bid, ask) in [((9_700, 100), (9_800, 100)), ((9_700, 10), (10_100, 10)), ((9_800, 10), (10_000, 10))] {
            let cmds = etf(&mut t, bid, ask);
            assert!(
                !cmds.iter().any(|c| matches!(c, Command::Insert { side: Side::Buy, .. })),
                "buy inserted at limit: {cmds:?}"
            );
        }
        assert_eq!(t.fees(), 13);
    }

    #[test]
    fn unchanged_fair_value_does_not_churn() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        let cmds = etf(&mut t, (9_800, 10), (10_000, 10));
        assert_eq!(cmds.len(), 2);
        assert!(etf(&mut t, (9_800, 10), (10_000, 10)).is_empty());
        assert!(etf(&mut t, (9_800, 30), (10_000, 5)).is_empty());
    }

    #[test]
    fn fair_value_move_cancels_then_reinserts_after_confirmation() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_800, 10), (10_000, 10));
        let old_ask = t.book().resting(Side::Sell).unwrap().id;
        let old_bid = t.book().resting(Side::Buy).unwrap().id;

        future(&mut t, 10_000, 10_100);
        let cmds = etf(&mut t, (9_900, 10), (10_100, 10));
        assert_eq!(cmds, vec![Command::Cancel { id: old_ask }, Command::Cancel { id: old_bid }]);

        // cancels not confirmed yet: old quotes stay the only resting orders
        assert!(etf(&mut t, (9_900, 10), (10_100, 10)).is_empty());
        assert_eq!(t.book().ids_tagged(OrderTag::RestingBid), vec![old_bid]);
        assert_eq!(t.book().ids_tagged(OrderTag::RestingAsk), vec![old_ask]);

        // a fill racing the cancel still lands on the old bid
        t.on_order_filled(old_bid, 9_800, 5);
        assert_eq!(t.position(), 5);
        t.on_order_status(old_bid, 5, 0, 0);
        t.on_order_status(old_ask, 0, 0, 0);
        std::mem::take(t.sink_mut());

        let cmds = etf(&mut t, (9_900, 10), (10_100, 10));
        assert_eq!(
            cmds,
            vec![
                Command::Insert { id: 4, side: Side::Sell, price: 10_100, volume: 25, lifespan: Lifespan::GoodForDay },
                Command::Insert { id: 5, side: Side::Buy, price: 9_900, volume: 25, lifespan: Lifespan::GoodForDay },
            ]
        );
    }

    #[test]
    fn unconfirmed_fak_counts_against_the_limit() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        let first = etf(&mut t, (9_700, 100), (9_800, 100));
        assert_eq!(first, vec![Command::Insert { id: 1, side: Side::Buy, price: 9_800, volume: 75, lifespan: Lifespan::FillAndKill }]);

        // no reply for id 1 yet
        let second = etf(&mut t, (9_700, 100), (9_800, 100));
        assert!(!second.iter().any(|c| matches!(c, Command::Insert { side: Side::Buy, .. })), "{second:?}");

        t.on_order_filled(1, 9_800, 75);
        let third = etf(&mut t, (9_700, 100), (9_800, 100));
        assert!(!third.iter().any(|c| matches!(c, Command::Insert { side: Side::Buy, .. })), "{third:?}");
        t.on_order_status(1, 75, 0, 15);
        assert_eq!(t.position(), 75);
    }

    #[test]
    fn error_after_partial_fill_keeps_fee_total() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_800, 10), (10_000, 10));
        let bid = t.book().resting(Side::Buy).unwrap().id;
        t.on_order_filled(bid, 9_800, 10);
        t.on_order_status(bid, 10, 15, -10);
        assert_eq!(t.fees(), -10);

        t.on_error(bid, "order halted");
        assert_eq!(t.fees(), -10);
        assert!(!t.book().contains(bid));
        assert_eq!(t.position(), 10);
    }

    #[test]
    fn rejected_hedge_is_forgotten() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_700, 10), (9_800, 10));
        t.on_order_filled(1, 9_800, 10);
        assert!(t.hedges.contains_key(&2));

        t.on_error(2, "hedge not marketable");
        assert!(t.hedges.is_empty());
        t.on_hedge_filled(2, 9_890, 10);
        assert_eq!(t.hedge_position(), 0);
        // FAK 1 is still waiting for its status
        assert_eq!(t.book().len(), 1);
    }

    #[test]
    fn terminal_status_frees_slot_and_late_fill_is_ignored() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_700, 10), (10_100, 10));
        let bid = t.book().resting(Side::Buy).unwrap().id;

        t.on_order_status(bid, 0, 0, 0);
        assert_eq!(t.book().resting(Side::Buy), None);
        assert!(!t.book().contains(bid));

        t.on_order_filled(bid, 9_800, 25);
        assert_eq!(t.position(), 0);
        assert!(t.sink().is_empty());
    }

    #[test]
    fn duplicate_fill_report_hedges_only_new_volume() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_700, 10), (9_800, 10));
        t.on_order_filled(1, 9_800, 10);
        t.on_order_filled(1, 9_800, 10);
        assert_eq!(t.position(), 10);
        let hedges: Vec<_> = t.sink().iter().filter(|c| matches!(c, Command::Hedge { .. })).collect();
        assert_eq!(hedges.len(), 1);
    }

    #[test]
    fn error_on_tracked_order_retires_it() {
        let mut t = trader();
        future(&mut t, 9_900, 10_000);
        etf(&mut t, (9_800, 10), (10_000, 10));
        let ask = t.book().resting(Side::Sell).unwrap().id;

        t.on_error(ask, "price out of range");
        assert_eq!(t.book().resting(Side::Sell), None);
        assert!(!t.book().contains(ask));

        let before = t.book().len();
        t.on_error(0, "rate limit");
        t.on_error(999, "unknown order");
        assert_eq!(t.book().len(), before);
    }

    #[test]
    fn dispatch_routes_events() {
        let mut t = trader();
        t.dispatch(&VenueEvent::OrderBook(BookSnapshot::top(Instrument::Future, 1, (9_900, 5), (10_000, 5))));
        t.dispatch(&VenueEvent::TradeTicks(BookSnapshot::top(Instrument::Etf, 2, (9_700, 1), (9_800, 1))));
        t.dispatch(&VenueEvent::OrderBook(BookSnapshot::top(Instrument::Etf, 3, (9_700, 5), (9_800, 5))));
        assert_eq!(t.sink().len(), 1);
        t.dispatch(&VenueEvent::OrderFilled { id: 1, price: 9_800, volume: 5 });
        t.dispatch(&VenueEvent::OrderStatus { id: 1, fill_volume: 5, remaining_volume: 0, fees: 1 });
        assert_eq!(t.position(), 5);
        assert!(t.book().is_empty());
    }

    // -------------------------------------------------------------------------
    // Randomized run against a tiny in-test venue that answers late: replies sit
    // in a FIFO queue for 0..=3 steps, cancels take effect late and resting
    // orders can fill while their cancel is pending. Checks the inventory bound,
    // one resting order per side, and hedge reconciliation once things settle.
    // -------------------------------------------------------------------------
    #[derive(Default)]
    struct TinyVenue {
        now: u64,
        resting: Vec<(OrderId, i64)>,
        cancels: Vec<(u64, OrderId)>,
        replies: VecDeque<(u64, VenueEvent)>,
    }

    impl TinyVenue {
        fn accept(&mut self, t: &mut AutoTrader<Vec<Command>>, rng: &mut StdRng) {
            for c in std::mem::take(t.sink_mut()) {
                let due = self.now + rng.gen_range(0..=3);
                match c {
                    Command::Insert { id, volume, lifespan: Lifespan::FillAndKill, .. } => {
                        let fill = rng.gen_range(0..=volume);
                        if fill > 0 {
                            self.replies.push_back((due, VenueEvent::OrderFilled { id, price: 0, volume: fill }));
                        }
                        self.replies.push_back((due, VenueEvent::OrderStatus { id, fill_volume: fill, remaining_volume: 0, fees: 0 }));
                    }
                    Command::Insert { id, volume, .. } => self.resting.push((id, volume)),
                    Command::Cancel { id } => self.cancels.push((due, id)),
                    Command::Hedge { id, volume, .. } => {
                        self.replies.push_back((due, VenueEvent::HedgeFilled { id, price: 0, volume }))
                    }
                }
            }
        }

        fn step(&mut self, t: &mut AutoTrader<Vec<Command>>, rng: &mut StdRng, fills: bool) {
            let now = self.now;
            if fills && !self.resting.is_empty() && rng.gen_bool(0.3) {
                let i = rng.gen_range(0..self.resting.len());
                let fill = rng.gen_range(1..=self.resting[i].1);
                self.resting[i].1 -= fill;
                let (id, left) = self.resting[i];
                let due = now + rng.gen_range(0..=2);
                self.replies.push_back((due, VenueEvent::OrderFilled { id, price: 0, volume: fill }));
                if left == 0 {
                    self.resting.remove(i);
                    self.replies.push_back((due, VenueEvent::OrderStatus { id, fill_volume: fill, remaining_volume: 0, fees: 0 }));
                }
            }

            let (due, later): (Vec<_>, Vec<_>) = self.cancels.drain(..).partition(|(at, _)| *at <= now);
            self.cancels = later;
            for (_, id) in due {
                if let Some(i) = self.resting.iter().position(|(r, _)| *r == id) {
                    self.resting.remove(i);
                    self.replies.push_back((now, VenueEvent::OrderStatus { id, fill_volume: 0, remaining_volume: 0, fees: 0 }));
                }
            }

            while self.replies.front().is_some_and(|(at, _)| *at <= now) {
                if let Some((_, ev)) = self.replies.pop_front() {
                    t.dispatch(&ev);
                }
            }
            self.accept(t, rng);
            self.now += 1;
        }

        fn idle(&self) -> bool { self.cancels.is_empty() && self.replies.is_empty() }
    }

    #[test]
    fn random_session_keeps_invariants() {
        let params = Params::default();
        let limit = params.position_limit;
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut t = AutoTrader::new(params.clone(), Vec::new());
            let mut venue = TinyVenue::default();
            let mut mid: i64 = 10_000;

            for seq in 0..400u64 {
                mid = (mid + 100 * rng.gen_range(-1..=1)).max(1_000);
                let fut = BookSnapshot::top(Instrument::Future, seq, (mid - 100, 50), (mid + 100, 50));
                t.on_order_book(&fut);

                let e_mid = mid + 100 * rng.gen_range(-3..=3);
                let half = 100 * rng.gen_range(1..=2);
                let snap = BookSnapshot::top(
                    Instrument::Etf,
                    seq,
                    (e_mid - half, rng.gen_range(1..=200)),
                    (e_mid + half, rng.gen_range(1..=200)),
                );
                t.on_order_book(&snap);
                venue.accept(&mut t, &mut rng);
                venue.step(&mut t, &mut rng, true);

                assert!(t.position().abs() <= limit, "seed {seed}: position {}", t.position());
                assert!(t.book().ids_tagged(OrderTag::RestingBid).len() <= 1, "seed {seed}: two bids");
                assert!(t.book().ids_tagged(OrderTag::RestingAsk).len() <= 1, "seed {seed}: two asks");
            }

            for _ in 0..100 {
                if venue.idle() {
                    break;
                }
                venue.step(&mut t, &mut rng, false);
            }
            assert!(venue.idle(), "seed {seed}: venue never settled");
            assert_eq!(t.hedge_position(), -t.position(), "seed {seed}: hedge drift");
        }
    }

    #[tokio::test]
    async fn run_loop_forwards_commands_and_records() {
        let (ev_tx, ev_rx) = mpsc::channel(16);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (rec_tx, mut rec_rx) = mpsc::channel(64);

        ev_tx.send(VenueEvent::OrderBook(BookSnapshot::top(Instrument::Future, 1, (9_900, 5), (10_000, 5)))).await.unwrap();
        ev_tx.send(VenueEvent::OrderBook(BookSnapshot::top(Instrument::Etf, 1, (9_700, 5), (9_800, 5)))).await.unwrap();
        drop(ev_tx);

        let t = run(ev_rx, cmd_tx, Params::default(), Some(rec_tx)).await;
        assert_eq!(t.book().len(), 1);
        assert_eq!(
            cmd_rx.recv().await,
            Some(Command::Insert { id: 1, side: Side::Buy, price: 9_800, volume: 5, lifespan: Lifespan::FillAndKill })
        );

        let mut lines = 0;
        while rec_rx.try_recv().is_ok() {
            lines += 1;
        }
        assert_eq!(lines, 3);
    }
}
