// ===============================
// src/orders.rs (id allocator + registry of our own live orders)
// ===============================
use ahash::AHashMap as HashMap;

use crate::domain::{Lifespan, OrderId, Side};

/// Monotonic order ids, starting at 1. Zero is never issued.
#[derive(Debug)]
pub struct OrderIds { next: OrderId }

impl Default for OrderIds {
    fn default() -> Self { Self { next: 1 } }
}

impl OrderIds {
    pub fn next_id(&mut self) -> OrderId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Tracking category of an owned order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderTag { RestingBid, RestingAsk, AggressiveBid, AggressiveAsk }

impl OrderTag {
    pub fn new(side: Side, lifespan: Lifespan) -> Self {
        match (side, lifespan) {
            (Side::Buy, Lifespan::GoodForDay) => OrderTag::RestingBid,
            (Side::Sell, Lifespan::GoodForDay) => OrderTag::RestingAsk,
            (Side::Buy, Lifespan::FillAndKill) => OrderTag::AggressiveBid,
            (Side::Sell, Lifespan::FillAndKill) => OrderTag::AggressiveAsk,
        }
    }
    pub fn side(&self) -> Side {
        match self {
            OrderTag::RestingBid | OrderTag::AggressiveBid => Side::Buy,
            OrderTag::RestingAsk | OrderTag::AggressiveAsk => Side::Sell,
        }
    }
    pub fn is_resting(&self) -> bool { matches!(self, OrderTag::RestingBid | OrderTag::RestingAsk) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOrder {
    pub tag: OrderTag,
    pub price: i64,
    pub volume: i64,
    pub filled: i64,
    pub fees: i64,
    pub cancel_sent: bool,
}

/// The resting quote currently occupying one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestingQuote { pub id: OrderId, pub price: i64 }

/// Every live order we placed, keyed by id, plus the two resting-quote slots.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: HashMap<OrderId, TrackedOrder>,
    bid: Option<RestingQuote>,
    ask: Option<RestingQuote>,
}

impl OrderBook {
    /// Register a freshly submitted order. Resting orders also take over their side's slot.
    pub fn register(&mut self, id: OrderId, side: Side, price: i64, volume: i64, lifespan: Lifespan) {
        let tag = OrderTag::new(side, lifespan);
        self.orders.insert(id, TrackedOrder { tag, price, volume, filled: 0, fees: 0, cancel_sent: false });
        if tag.is_resting() {
            *self.slot_mut(side) = Some(RestingQuote { id, price });
        }
    }

    pub fn resting(&self, side: Side) -> Option<RestingQuote> {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<RestingQuote> {
        match side {
            Side::Buy => &mut self.bid,
            Side::Sell => &mut self.ask,
        }
    }

    pub fn get(&self, id: OrderId) -> Option<&TrackedOrder> { self.orders.get(&id) }
    pub fn contains(&self, id: OrderId) -> bool { self.orders.contains_key(&id) }
    pub fn len(&self) -> usize { self.orders.len() }
    pub fn is_empty(&self) -> bool { self.orders.is_empty() }

    /// Unfilled volume of live fill-and-kill orders on `side` (not yet reported done).
    pub fn aggressive_unfilled(&self, side: Side) -> i64 {
        self.orders
            .values()
            .filter(|o| !o.tag.is_resting() && o.tag.side() == side)
            .map(|o| (o.volume - o.filled).max(0))
            .sum()
    }

    /// Ids tracked under `tag`.
    #[cfg(test)]
    pub fn ids_tagged(&self, tag: OrderTag) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.orders.iter().filter(|(_, o)| o.tag == tag).map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the resting order id on `side` if a cancel should go out now.
    /// A given id is handed out at most once.
    pub fn take_cancel(&mut self, side: Side) -> Option<OrderId> {
        let q = self.resting(side)?;
        let o = self.orders.get_mut(&q.id)?;
        if o.cancel_sent {
            return None;
        }
        o.cancel_sent = true;
        Some(q.id)
    }

    /// Apply a fill, capped at the order's unfilled volume.
    /// Returns the tag and the volume actually applied; unknown ids give `None`.
    pub fn record_fill(&mut self, id: OrderId, volume: i64) -> Option<(OrderTag, i64)> {
        let o = self.orders.get_mut(&id)?;
        let applied = volume.min(o.volume - o.filled).max(0);
        o.filled += applied;
        Some((o.tag, applied))
    }

    /// Store the venue's cumulative fee figure for `id`; returns the change since the last one.
    pub fn record_fees(&mut self, id: OrderId, fees: i64) -> i64 {
        match self.orders.get_mut(&id) {
            Some(o) => {
                let delta = fees - o.fees;
                o.fees = fees;
                delta
            }
            None => 0,
        }
    }

    /// Drop `id` from tracking and free its slot if it was the resting quote.
    /// Removing an absent id is a no-op.
    pub fn retire(&mut self, id: OrderId) -> Option<TrackedOrder> {
        for side in [Side::Buy, Side::Sell] {
            let slot = self.slot_mut(side);
            if matches!(slot, Some(q) if q.id == id) {
                *slot = None;
            }
        }
        self.orders.remove(&id)
    }
}
