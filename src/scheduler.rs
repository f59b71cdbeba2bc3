/// Deterministic event scheduler.
///
/// Owns the event queue, the virtual clock and the run-state machine.
/// The clock only moves inside `next_due`, which is the run loop's single
/// way of obtaining the next event to fire. Event IDs are strictly
/// increasing, so two runs that schedule the same things in the same
/// order dispatch them in the same order.

use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Callback, Event, EventHandle, EventIdGen};
use crate::queue::EventQueue;
use crate::time::Time;

/// Lifecycle of a scheduler.
///
/// `Idle → Running → Stopped → Destroyed`. A stopped scheduler may be run
/// again; a destroyed one may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
    Destroyed,
}

/// Why the last run returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No events were left.
    Drained,
    /// `stop()` was called.
    Requested,
    /// The next event lay beyond the stop time.
    Horizon,
}

#[derive(Debug)]
pub struct Scheduler {
    queue: EventQueue,
    ids: EventIdGen,
    now: Time,
    state: SchedulerState,
    /// Hard ceiling set by `stop_after`.
    stop_at: Option<Time>,
    stop_requested: bool,
    halted_by_horizon: bool,
    events_processed: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: EventQueue::new(),
            ids: EventIdGen::new(),
            now: Time::ZERO,
            state: SchedulerState::Idle,
            stop_at: None,
            stop_requested: false,
            halted_by_horizon: false,
            events_processed: 0,
        }
    }

    #[inline]
    pub fn now(&self) -> Time {
        self.now
    }

    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The pending stop time, if one is set.
    pub fn stop_time(&self) -> Option<Time> {
        self.stop_at
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Queued events, including cancelled ones not yet discarded.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next event that would fire, ignoring the stop time.
    pub fn next_event_time(&mut self) -> Option<Time> {
        self.queue.peek_time()
    }

    /// Queue `callback` to run `delay` after now.
    pub fn try_schedule(&mut self, delay: Time, callback: Callback) -> SimResult<EventHandle> {
        if self.state == SchedulerState::Destroyed {
            return Err(SimError::ScheduleAfterDestroy { delay });
        }
        if delay.is_negative() {
            return Err(SimError::InvalidDelay {
                delay,
                now: self.now,
            });
        }
        let at = self
            .now
            .checked_add(delay)
            .ok_or(SimError::TimeOverflow {
                delay,
                now: self.now,
            })?;
        let id = self.ids.next_id();
        let (event, handle) = Event::new(id, at, callback);
        trace!(event = %id, %at, "scheduled");
        self.queue.insert(event);
        Ok(handle)
    }

    /// Mark the event cancelled. No-op if it already fired or was
    /// cancelled; returns whether this call cancelled it.
    pub fn cancel(&mut self, handle: &EventHandle) -> bool {
        let cancelled = handle.cancel();
        if cancelled {
            trace!(event = %handle.id(), at = %handle.at(), "cancelled");
        }
        cancelled
    }

    /// Halt the run loop once the current callback returns.
    pub fn stop(&mut self) {
        debug!(now = %self.now, "stop requested");
        self.stop_requested = true;
    }

    /// Set the stop time to `now + delay`. Events strictly after it never
    /// fire during this run. With several calls the earliest time wins.
    pub fn stop_after(&mut self, delay: Time) -> SimResult<()> {
        if delay.is_negative() {
            return Err(SimError::InvalidDelay {
                delay,
                now: self.now,
            });
        }
        let at = self.now.checked_add(delay).ok_or(SimError::TimeOverflow {
            delay,
            now: self.now,
        })?;
        let at = self.stop_at.map_or(at, |existing| existing.min(at));
        debug!(stop_at = %at, "stop time set");
        self.stop_at = Some(at);
        Ok(())
    }

    /// Enter `Running`. Fails on a destroyed or already running scheduler.
    pub(crate) fn begin_run(&mut self) -> SimResult<()> {
        match self.state {
            SchedulerState::Destroyed => Err(SimError::RunAfterDestroy),
            SchedulerState::Running => Err(SimError::ReentrantRun),
            SchedulerState::Idle | SchedulerState::Stopped => {
                self.state = SchedulerState::Running;
                self.stop_requested = false;
                self.halted_by_horizon = false;
                Ok(())
            }
        }
    }

    /// Pop the next event that may fire and advance the clock to it.
    ///
    /// Returns `None` when the queue is drained, `stop()` was requested,
    /// or the next event lies beyond the stop time.
    pub(crate) fn next_due(&mut self) -> Option<Event> {
        if self.stop_requested {
            return None;
        }
        let at = self.queue.peek_time()?;
        if let Some(limit) = self.stop_at {
            if at > limit {
                self.halted_by_horizon = true;
                return None;
            }
        }
        let event = self.queue.pop_min()?;

        // Virtual time must never go backward.
        assert!(
            event.at >= self.now,
            "time went backward: now={}, event={} at {}",
            self.now,
            event.id,
            event.at
        );
        self.now = event.at;
        self.events_processed += 1;
        trace!(event = %event.id, now = %self.now, "dispatch");
        Some(event)
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Leave `Running`. A stop time that ended (or outlived) the run is
    /// consumed and the clock is moved up to it.
    pub(crate) fn finish_run(&mut self) -> StopReason {
        self.state = SchedulerState::Stopped;
        let reason = if self.stop_requested {
            StopReason::Requested
        } else if self.halted_by_horizon {
            StopReason::Horizon
        } else {
            StopReason::Drained
        };
        if reason != StopReason::Requested {
            if let Some(limit) = self.stop_at.take() {
                if limit > self.now {
                    self.now = limit;
                }
            }
        }
        self.stop_requested = false;
        reason
    }

    /// Leave `Running` early, keeping any stop time armed for the next run.
    pub(crate) fn pause(&mut self) {
        self.state = SchedulerState::Stopped;
        self.stop_requested = false;
        self.halted_by_horizon = false;
    }

    /// Drop all pending events and enter the terminal state. Idempotent.
    pub(crate) fn destroy(&mut self) -> SimResult<()> {
        match self.state {
            SchedulerState::Running => Err(SimError::DestroyWhileRunning),
            SchedulerState::Destroyed => Ok(()),
            SchedulerState::Idle | SchedulerState::Stopped => {
                self.queue.clear();
                self.stop_at = None;
                self.state = SchedulerState::Destroyed;
                Ok(())
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
