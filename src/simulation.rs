/// Simulation execution loop.
///
/// `Simulator` owns the scheduler, the topology arena, the installed
/// applications and the packet trace. Every event callback receives
/// `&mut Simulator`, so a callback can read the clock, reschedule itself,
/// and send packets without any shared or global state. Independent
/// simulators can run side by side in one process.
///
/// The loop is purely synchronous and single-threaded, so a given
/// sequence of `schedule` calls always dispatches in the same order.

use tracing::{debug, info};

use crate::app::AppSlot;
use crate::error::SimResult;
use crate::event::{Callback, EventHandle};
use crate::net::Network;
use crate::scheduler::{Scheduler, SchedulerState, StopReason};
use crate::time::Time;
use crate::trace::{DropHook, TraceLog};

/// Top-level simulation driver.
pub struct Simulator {
    pub(crate) scheduler: Scheduler,
    pub(crate) network: Network,
    pub(crate) apps: Vec<AppSlot>,
    pub(crate) trace: Option<TraceLog>,
    pub(crate) drop_hook: Option<DropHook>,
    last_stop: Option<StopReason>,
}

impl Simulator {
    /// A simulator with an empty topology and the clock at zero.
    pub fn new() -> Self {
        Simulator {
            scheduler: Scheduler::new(),
            network: Network::new(),
            apps: Vec::new(),
            trace: None,
            drop_hook: None,
            last_stop: None,
        }
    }

    /// Current virtual time. Inside a callback, the time of the event
    /// being processed.
    #[inline]
    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Total events fired over the simulator's lifetime.
    pub fn events_processed(&self) -> u64 {
        self.scheduler.events_processed()
    }

    /// Queued events, including cancelled ones not yet discarded.
    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    /// Why the most recent `run`/`run_for` returned.
    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_stop
    }

    // ── Scheduling ────────────────────────────────────────────

    /// Run `f` after `delay`.
    ///
    /// # Panics
    /// Panics if `delay` is negative, if `now + delay` overflows, or if
    /// the simulator has been destroyed. Use [`try_schedule`] to get the
    /// error back instead.
    ///
    /// [`try_schedule`]: Simulator::try_schedule
    pub fn schedule<F>(&mut self, delay: Time, f: F) -> EventHandle
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        match self.scheduler.try_schedule(delay, Box::new(f)) {
            Ok(handle) => handle,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_schedule<F>(&mut self, delay: Time, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.scheduler.try_schedule(delay, Box::new(f))
    }

    /// Run `f` at the current time, after every event already queued for
    /// the current time.
    pub fn schedule_now<F>(&mut self, f: F) -> EventHandle
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule(Time::ZERO, f)
    }

    /// Cancel a pending event. Returns `false` if it already fired or was
    /// cancelled; calling it again has no further effect.
    pub fn cancel(&mut self, handle: &EventHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    // ── Running ───────────────────────────────────────────────

    /// Fire events until the queue drains, `stop()` is called, or the
    /// next event lies beyond the `stop_after` time.
    ///
    /// Returns the number of events fired during this call.
    ///
    /// # Panics
    /// Panics when called after `destroy()` or from inside a callback.
    pub fn run(&mut self) -> u64 {
        self.run_loop(None)
    }

    /// Like [`run`](Simulator::run), but returns after at most
    /// `max_events` events. A stop time that was not reached stays armed.
    pub fn run_for(&mut self, max_events: u64) -> u64 {
        self.run_loop(Some(max_events))
    }

    /// Fire exactly one event. Returns `false` if nothing was due.
    pub fn step(&mut self) -> bool {
        self.run_loop(Some(1)) == 1
    }

    fn run_loop(&mut self, limit: Option<u64>) -> u64 {
        if let Err(e) = self.scheduler.begin_run() {
            panic!("{e}");
        }
        info!(now = %self.now(), pending = self.pending_events(), "run started");

        let mut fired = 0u64;
        let mut hit_limit = false;
        loop {
            if limit.is_some_and(|max| fired >= max) {
                hit_limit = true;
                break;
            }
            let Some(event) = self.scheduler.next_due() else {
                break;
            };
            let callback: Callback = event.fire();
            callback(self);
            fired += 1;
            if self.scheduler.stop_requested() {
                break;
            }
        }

        let reason = if hit_limit && !self.scheduler.stop_requested() {
            self.scheduler.pause();
            None
        } else {
            Some(self.scheduler.finish_run())
        };
        self.last_stop = reason;
        info!(
            fired,
            total = self.events_processed(),
            now = %self.now(),
            reason = ?reason,
            "run finished"
        );
        fired
    }

    /// Halt the running loop once the current callback returns. Outside a
    /// run this has no effect.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Stop the next run at `now + delay`: events at exactly that time
    /// still fire, later ones never do.
    pub fn stop_after(&mut self, delay: Time) -> SimResult<()> {
        self.scheduler.stop_after(delay)
    }

    /// Release the topology, applications, trace and pending events.
    /// Idempotent. Any further `schedule` or `run` fails.
    pub fn destroy(&mut self) -> SimResult<()> {
        self.scheduler.destroy()?;
        self.network.clear();
        self.apps.clear();
        self.trace = None;
        self.drop_hook = None;
        debug!(now = %self.now(), "simulator destroyed");
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now())
            .field("state", &self.state())
            .field("pending", &self.pending_events())
            .field("nodes", &self.network.nodes.len())
            .field("devices", &self.network.devices.len())
            .field("apps", &self.apps.len())
            .field("tracing", &self.trace.is_some())
            .finish()
    }
}
