//! Events: deferred callbacks stamped with a virtual time and a
//! sequence number.
//!
//! Every effect in a simulation is an `Event`. The queue orders them by
//! `(at, id)`, so two events at the same instant fire in the order they
//! were scheduled.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::simulation::Simulator;
use crate::time::Time;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing event sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic event-ID generator. One per scheduler.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event state ──────────────────────────────────────────────────────

/// Lifecycle of a scheduled event, shared between the queued event and
/// every handle pointing at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    Cancelled,
    Fired,
}

/// The deferred action. It receives the whole simulator so it can send
/// packets, inspect the topology and schedule follow-up work.
pub type Callback = Box<dyn FnOnce(&mut Simulator)>;

// ── Event ─────────────────────────────────────────────────────────────

/// A single queued event.
pub struct Event {
    pub id: EventId,
    pub at: Time,
    pub(crate) state: Rc<Cell<EventState>>,
    pub(crate) callback: Callback,
}

impl Event {
    pub(crate) fn new(id: EventId, at: Time, callback: Callback) -> (Self, EventHandle) {
        let state = Rc::new(Cell::new(EventState::Pending));
        let handle = EventHandle {
            id,
            at,
            state: Rc::clone(&state),
        };
        (
            Event {
                id,
                at,
                state,
                callback,
            },
            handle,
        )
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.get() == EventState::Cancelled
    }

    /// Mark the event fired and hand back its callback.
    pub(crate) fn fire(self) -> Callback {
        self.state.set(EventState::Fired);
        self.callback
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("at", &self.at)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Ordering: smallest `(at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for Event {}

// ── Event handle ─────────────────────────────────────────────────────

/// Returned by `schedule`; the only way to cancel an event.
#[derive(Debug, Clone)]
pub struct EventHandle {
    id: EventId,
    at: Time,
    state: Rc<Cell<EventState>>,
}

impl EventHandle {
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The absolute time the event was scheduled for.
    pub fn at(&self) -> Time {
        self.at
    }

    pub fn state(&self) -> EventState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state.get() == EventState::Pending
    }

    /// Mark the event cancelled. Returns `false` if it had already fired
    /// or been cancelled.
    pub(crate) fn cancel(&self) -> bool {
        if self.state.get() == EventState::Pending {
            self.state.set(EventState::Cancelled);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Box::new(|_sim: &mut Simulator| {})
    }

    #[test]
    fn test_event_id_monotonic() {
        let mut gen = EventIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(gen.peek().raw(), 2);
        assert!(a < b);
    }

    #[test]
    fn test_event_ordering_by_time() {
        let (e1, _) = Event::new(EventId::new(1), Time::millis(10), noop());
        let (e2, _) = Event::new(EventId::new(0), Time::millis(20), noop());
        // Earlier time wins regardless of id: e1 > e2 in reversed ordering.
        assert!(e1 > e2);
    }

    #[test]
    fn test_event_ordering_tiebreak_by_id() {
        let (e1, _) = Event::new(EventId::new(0), Time::millis(10), noop());
        let (e2, _) = Event::new(EventId::new(1), Time::millis(10), noop());
        assert!(e1 > e2);
    }

    #[test]
    fn test_handle_tracks_state() {
        let (event, handle) = Event::new(EventId::new(7), Time::seconds(1), noop());
        assert!(handle.is_pending());
        assert_eq!(handle.at(), Time::seconds(1));
        let _callback = event.fire();
        assert_eq!(handle.state(), EventState::Fired);
        assert!(!handle.cancel());
        assert_eq!(handle.state(), EventState::Fired);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (event, handle) = Event::new(EventId::new(0), Time::ZERO, noop());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(event.is_cancelled());
    }

    #[test]
    fn test_display() {
        assert_eq!(EventId::new(42).to_string(), "E#42");
    }
}
