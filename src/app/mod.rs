//! Applications: traffic sources and sinks installed on a device.
//!
//! An application never touches the scheduler directly. It is started
//! and stopped by events the simulator schedules at install time, gets
//! packets through the device's receive callback, and drives itself with
//! timers. Every hook receives an [`AppContext`] scoped to the app's own
//! node and device.

pub mod echo;
pub mod onoff;
pub mod sink;

use std::any::Any;

use tracing::{debug, trace};

pub use echo::{EchoClient, EchoServer};
pub use onoff::OnOffApplication;
pub use sink::PacketSink;

use crate::error::{SimError, SimResult};
use crate::event::EventHandle;
use crate::net::{AppId, DeviceId, DropReason, NodeId, Packet};
use crate::simulation::Simulator;
use crate::time::Time;

// ── Application ───────────────────────────────────────────────────────

/// Trait implemented by every installed application.
///
/// # Example
///
/// ```rust
/// use linksim::app::{AppContext, Application};
/// use linksim::net::Packet;
///
/// #[derive(Default)]
/// struct Counter { seen: u64 }
///
/// impl Application for Counter {
///     fn receive(&mut self, _ctx: &mut AppContext<'_>, _packet: Packet) {
///         self.seen += 1;
///     }
///     fn as_any(&self) -> &dyn std::any::Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
/// }
/// ```
pub trait Application {
    /// Called at the install-time start time.
    fn start(&mut self, _ctx: &mut AppContext<'_>) {}

    /// Called at the stop time. Receive callbacks are already detached.
    fn stop(&mut self, _ctx: &mut AppContext<'_>) {}

    /// A packet arrived on the app's device.
    fn receive(&mut self, _ctx: &mut AppContext<'_>, _packet: Packet) {}

    /// A timer set with [`AppContext::schedule_timer`] fired.
    fn timer(&mut self, _ctx: &mut AppContext<'_>, _token: u64) {}

    /// Downcast support for [`Simulator::app`].
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ── Context ───────────────────────────────────────────────────────────

/// What an application sees while one of its hooks runs.
pub struct AppContext<'a> {
    sim: &'a mut Simulator,
    app: AppId,
    node: NodeId,
    device: DeviceId,
}

impl AppContext<'_> {
    #[inline]
    pub fn now(&self) -> Time {
        self.sim.now()
    }

    pub fn app_id(&self) -> AppId {
        self.app
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Send on the app's own device.
    pub fn send(&mut self, packet: Packet) -> Result<(), DropReason> {
        self.sim.send(self.device, packet)
    }

    /// Call [`Application::timer`] with `token` after `delay`. The timer is
    /// ignored if the app has stopped by then.
    pub fn schedule_timer(&mut self, delay: Time, token: u64) -> EventHandle {
        let app = self.app;
        self.sim.schedule(delay, move |sim| sim.app_timer(app, token))
    }

    pub fn cancel(&mut self, handle: &EventHandle) -> bool {
        self.sim.cancel(handle)
    }

    /// The whole simulator, for anything not covered above.
    pub fn sim(&mut self) -> &mut Simulator {
        self.sim
    }
}

// ── Storage ───────────────────────────────────────────────────────────

pub(crate) struct AppSlot {
    node: NodeId,
    device: DeviceId,
    /// `None` while one of its hooks is running.
    app: Option<Box<dyn Application>>,
    running: bool,
    /// Receive-callback epoch of the device while this app listens on it.
    receive_epoch: Option<u64>,
}

impl Simulator {
    /// Install `app` on `device`. `start` and `stop` are absolute times; the
    /// start and stop events go through the scheduler like any other.
    pub fn install_app(
        &mut self,
        device: DeviceId,
        app: Box<dyn Application>,
        start: Time,
        stop: Option<Time>,
    ) -> SimResult<AppId> {
        let node = self
            .device(device)
            .ok_or(SimError::UnknownDevice(device))?
            .node();
        let now = self.now();
        let delay_until = |at: Time| match at.checked_sub(now) {
            Some(delay) if !delay.is_negative() => Ok(delay),
            _ => Err(SimError::InvalidDelay { delay: at - now, now }),
        };
        let start_delay = delay_until(start)?;
        let stop_delay = stop.map(delay_until).transpose()?;

        let id = AppId::from_index(self.apps.len());
        self.try_schedule(start_delay, move |sim| sim.start_app(id))?;
        if let Some(delay) = stop_delay {
            self.try_schedule(delay, move |sim| sim.stop_app(id))?;
        }
        self.apps.push(AppSlot {
            node,
            device,
            app: Some(app),
            running: false,
            receive_epoch: None,
        });
        debug!(app = %id, %node, %device, %start, ?stop, "application installed");
        Ok(id)
    }

    /// Downcast an installed application for inspection.
    pub fn app<T: Application + 'static>(&self, id: AppId) -> Option<&T> {
        self.apps.get(id.index())?.app.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn app_mut<T: Application + 'static>(&mut self, id: AppId) -> Option<&mut T> {
        self.apps
            .get_mut(id.index())?
            .app
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    pub fn app_is_running(&self, id: AppId) -> bool {
        self.apps.get(id.index()).is_some_and(|s| s.running)
    }

    fn start_app(&mut self, id: AppId) {
        let Some(slot) = self.apps.get_mut(id.index()) else {
            return;
        };
        if slot.running {
            return;
        }
        let device = slot.device;
        if let Err(e) = self.claim_receive(id, device) {
            debug!(app = %id, %device, error = %e, "application not started");
            return;
        }
        debug!(app = %id, %device, now = %self.now(), "application started");
        self.dispatch(id, |app, ctx| app.start(ctx));
    }

    /// Mark `id` running and make sure the device callback fans out to the
    /// apps on `device`. An app that starts while another already owns the
    /// callback shares it.
    fn claim_receive(&mut self, id: AppId, device: DeviceId) -> SimResult<()> {
        let current = self
            .receive_epoch(device)
            .ok_or(SimError::UnknownDevice(device))?;
        let shared = self
            .apps
            .iter()
            .any(|s| s.running && s.device == device && s.receive_epoch == Some(current));
        let epoch = if shared {
            current
        } else {
            self.set_receive_callback(device, |sim, device, packet| {
                sim.deliver_to_apps(device, packet)
            })?;
            let epoch = self
                .receive_epoch(device)
                .ok_or(SimError::UnknownDevice(device))?;
            // Apps still listening on an older callback move to this one.
            for s in self.apps.iter_mut().filter(|s| s.running && s.device == device) {
                s.receive_epoch = Some(epoch);
            }
            epoch
        };
        if let Some(slot) = self.apps.get_mut(id.index()) {
            slot.running = true;
            slot.receive_epoch = Some(epoch);
        }
        Ok(())
    }

    fn stop_app(&mut self, id: AppId) {
        let Some(slot) = self.apps.get_mut(id.index()) else {
            return;
        };
        if !slot.running {
            return;
        }
        slot.running = false;
        let owned = slot.receive_epoch.take();
        let device = slot.device;
        debug!(app = %id, %device, now = %self.now(), "application stopped");

        // Detach only when no other app still listens and the callback is
        // the one the apps installed.
        let others = self.apps.iter().any(|s| s.running && s.device == device);
        if !others && owned.is_some() && owned == self.receive_epoch(device) {
            if let Err(e) = self.clear_receive_callback(device) {
                debug!(app = %id, %device, error = %e, "receive callback not cleared");
            }
        }
        self.dispatch(id, |app, ctx| app.stop(ctx));
    }

    /// Hand a delivered packet to every running app on `device`, in install
    /// order.
    fn deliver_to_apps(&mut self, device: DeviceId, packet: Packet) {
        let targets: Vec<AppId> = self
            .apps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.running && s.device == device)
            .map(|(i, _)| AppId::from_index(i))
            .collect();
        let Some((&last, rest)) = targets.split_last() else {
            return;
        };
        for &id in rest {
            self.app_receive(id, packet.clone());
        }
        self.app_receive(last, packet);
    }

    fn app_receive(&mut self, id: AppId, packet: Packet) {
        if self.app_is_running(id) {
            self.dispatch(id, move |app, ctx| app.receive(ctx, packet));
        }
    }

    fn app_timer(&mut self, id: AppId, token: u64) {
        if self.app_is_running(id) {
            trace!(app = %id, token, "app timer");
            self.dispatch(id, move |app, ctx| app.timer(ctx, token));
        }
    }

    /// Take the app out of its slot, run `f`, and put it back.
    fn dispatch<F>(&mut self, id: AppId, f: F)
    where
        F: FnOnce(&mut dyn Application, &mut AppContext<'_>),
    {
        let Some(slot) = self.apps.get_mut(id.index()) else {
            return;
        };
        let (node, device) = (slot.node, slot.device);
        let Some(mut app) = slot.app.take() else {
            return;
        };
        {
            let mut ctx = AppContext {
                sim: self,
                app: id,
                node,
                device,
            };
            f(app.as_mut(), &mut ctx);
        }
        // The simulator may have been torn down by the hook.
        if let Some(slot) = self.apps.get_mut(id.index()) {
            slot.app = Some(app);
        }
    }
}
