// ===============================
// src/lifecycle.rs (status / error -> retire tracked orders)
// ===============================
use tracing::{debug, warn};

use crate::domain::{OrderId, VenueEvent};
use crate::orders::{OrderBook, OrderTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Still has remaining volume at the venue.
    Working,
    /// Terminal: removed from tracking (slot released if it was resting).
    Retired { tag: OrderTag, filled: i64 },
    /// Not ours, or already retired.
    Untracked,
}

/// Apply an order-status notification. Zero remaining volume is terminal
/// whatever the cause (filled, cancelled, rejected).
pub fn resolve_status(book: &mut OrderBook, id: OrderId, fill_volume: i64, remaining_volume: i64) -> Outcome {
    if remaining_volume != 0 {
        return match book.get(id) {
            Some(o) => {
                debug!(id, filled = o.filled, remaining_volume, "order working");
                Outcome::Working
            }
            None => Outcome::Untracked,
        };
    }
    match book.retire(id) {
        Some(o) => {
            debug!(id, tag = ?o.tag, price = o.price, fill_volume, "order retired");
            Outcome::Retired { tag: o.tag, filled: o.filled }
        }
        None => Outcome::Untracked,
    }
}

/// An error on a tracked order is handled as a zero-remaining status for it.
/// The status repeats the order's own fill and fee figures so running totals stay put.
/// Errors with id 0 or for ids we do not track only get logged.
pub fn error_as_status(book: &OrderBook, id: OrderId, message: &str) -> Option<VenueEvent> {
    if id != 0 {
        if let Some(o) = book.get(id) {
            return Some(VenueEvent::OrderStatus { id, fill_volume: o.filled, remaining_volume: 0, fees: o.fees });
        }
    }
    warn!(id, %message, "venue error for untracked order");
    None
}
