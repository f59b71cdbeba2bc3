/// Pending-event priority queue.
///
/// A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap keyed
/// by `(at, id)`. Cancellation is lazy: a cancelled event stays in the
/// heap until it reaches the top, where it is discarded without firing.

use std::collections::BinaryHeap;

use crate::event::{Event, EventState};
use crate::time::Time;

#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
        }
    }

    /// O(log n).
    pub fn insert(&mut self, event: Event) {
        self.heap.push(event);
    }

    /// Remove and return the earliest live event, discarding any
    /// cancelled events found on the way.
    pub fn pop_min(&mut self) -> Option<Event> {
        while let Some(event) = self.heap.pop() {
            if !event.is_cancelled() {
                return Some(event);
            }
        }
        None
    }

    /// Time of the earliest live event.
    pub fn peek_time(&mut self) -> Option<Time> {
        self.discard_cancelled_head();
        self.heap.peek().map(|e| e.at)
    }

    /// `true` when nothing is queued. Cancelled events still count until
    /// they are popped; use `peek_time` for an exact answer.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued events, including cancelled ones not yet discarded.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drop every queued event. Outstanding handles observe them as
    /// cancelled.
    pub fn clear(&mut self) {
        for event in self.heap.drain() {
            if event.state.get() == EventState::Pending {
                event.state.set(EventState::Cancelled);
            }
        }
    }

    /// Drain all live events in dispatch order without firing them.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.heap.len());
        while let Some(e) = self.pop_min() {
            events.push(e);
        }
        events
    }

    fn discard_cancelled_head(&mut self) {
        while self.heap.peek().is_some_and(Event::is_cancelled) {
            self.heap.pop();
        }
    }
}
