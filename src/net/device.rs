//! Network devices and the transmit-side timing model.
//!
//! A device serialises packets onto its channel at its configured data
//! rate. `send` enqueues; while the queue is non-empty the device is busy
//! and exactly one transmission-complete event is outstanding. When it
//! fires, the head packet leaves the queue, goes to the channel, and the
//! next packet (if any) starts clocking out. Back-to-back packets of
//! sizes S1, S2 therefore complete at S1/R and S1/R + S2/R.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::rate::DataRate;
use crate::simulation::Simulator;
use crate::trace::TraceKind;

use super::error_model::{ErrorModelState, RateErrorModel};
use super::id::{ChannelId, DeviceId, NodeId};
use super::packet::Packet;
use super::queue::{DropTailQueue, QueueCapacity};

/// Default MTU of a point-to-point device, in bytes.
pub const DEFAULT_MTU: u32 = 1500;

/// Invoked when a packet arrives at a device.
pub type ReceiveCallback = Box<dyn FnMut(&mut Simulator, DeviceId, Packet)>;

// ── Drop reasons ─────────────────────────────────────────────────────

/// Why a packet left the simulated network without being delivered.
///
/// Drops are normal network behaviour, not errors: they are returned or
/// counted, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The transmit queue was at capacity.
    QueueFull,
    /// The packet is larger than the device MTU.
    ExceedsMtu { size: u32, mtu: u32 },
    /// The receive-side error model corrupted the packet.
    ReceiveError,
    /// The receiving device had no callback registered.
    NoReceiver,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::QueueFull => write!(f, "QueueFull"),
            DropReason::ExceedsMtu { size, mtu } => write!(f, "ExceedsMtu({}>{})", size, mtu),
            DropReason::ReceiveError => write!(f, "ReceiveError"),
            DropReason::NoReceiver => write!(f, "NoReceiver"),
        }
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// Typed device configuration. Set before the first `send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub data_rate: DataRate,
    pub queue: QueueCapacity,
    /// `None` disables the MTU check.
    pub mtu: Option<u32>,
}

impl DeviceConfig {
    pub fn new(data_rate: DataRate) -> Self {
        DeviceConfig {
            data_rate,
            ..Default::default()
        }
    }

    pub fn with_queue(mut self, queue: QueueCapacity) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_mtu(mut self, mtu: Option<u32>) -> Self {
        self.mtu = mtu;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            data_rate: DataRate::default(),
            queue: QueueCapacity::default(),
            mtu: Some(DEFAULT_MTU),
        }
    }
}

// ── Counters ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounters {
    pub queue_full: u64,
    pub exceeds_mtu: u64,
    pub receive_error: u64,
    pub no_receiver: u64,
}

impl DropCounters {
    pub fn total(&self) -> u64 {
        self.queue_full + self.exceeds_mtu + self.receive_error + self.no_receiver
    }

    fn count(&mut self, reason: DropReason) {
        match reason {
            DropReason::QueueFull => self.queue_full += 1,
            DropReason::ExceedsMtu { .. } => self.exceeds_mtu += 1,
            DropReason::ReceiveError => self.receive_error += 1,
            DropReason::NoReceiver => self.no_receiver += 1,
        }
    }
}

/// Per-device traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Packets handed to the channel.
    pub tx_packets: u64,
    pub tx_bytes: u64,
    /// Packets passed to the receive callback.
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub drops: DropCounters,
}

// ── Device ───────────────────────────────────────────────────────────

/// A network interface owned by exactly one node.
pub struct Device {
    id: DeviceId,
    node: NodeId,
    index_on_node: usize,
    config: DeviceConfig,
    queue: DropTailQueue,
    pub(crate) channel: Option<ChannelId>,
    /// A transmission-complete event is outstanding.
    transmitting: bool,
    /// Set on the first `send`; configuration is frozen afterwards.
    locked: bool,
    pub(crate) address: Option<Ipv4Addr>,
    error_model: Option<ErrorModelState>,
    receive: Option<ReceiveCallback>,
    /// Bumped whenever the receive callback is replaced or cleared.
    receive_epoch: u64,
    stats: DeviceStats,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        node: NodeId,
        index_on_node: usize,
        config: DeviceConfig,
    ) -> Self {
        let queue = DropTailQueue::new(config.queue);
        Device {
            id,
            node,
            index_on_node,
            config,
            queue,
            channel: None,
            transmitting: false,
            locked: false,
            address: None,
            error_model: None,
            receive: None,
            receive_epoch: 0,
            stats: DeviceStats::default(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Position of this device in its node's device list.
    pub fn index_on_node(&self) -> usize {
        self.index_on_node
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn data_rate(&self) -> DataRate {
        self.config.data_rate
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    pub fn queue(&self) -> &DropTailQueue {
        &self.queue
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    pub fn has_receive_callback(&self) -> bool {
        self.receive.is_some()
    }

    pub fn error_model(&self) -> Option<&RateErrorModel> {
        self.error_model.as_ref().map(ErrorModelState::model)
    }

    fn ensure_unlocked(&self) -> SimResult<()> {
        if self.locked {
            Err(SimError::ConfigLocked { device: self.id })
        } else {
            Ok(())
        }
    }

    pub(crate) fn count_drop(&mut self, reason: DropReason) {
        self.stats.drops.count(reason);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("config", &self.config)
            .field("channel", &self.channel)
            .field("queued", &self.queue.len())
            .field("transmitting", &self.transmitting)
            .field("has_receive_callback", &self.receive.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

// ── Device operations on the simulator ───────────────────────────────

impl Simulator {
    fn device_mut_or_err(&mut self, device: DeviceId) -> SimResult<&mut Device> {
        self.network
            .devices
            .get_mut(device.index())
            .ok_or(SimError::UnknownDevice(device))
    }

    pub fn set_data_rate(&mut self, device: DeviceId, rate: DataRate) -> SimResult<()> {
        let dev = self.device_mut_or_err(device)?;
        dev.ensure_unlocked()?;
        if rate.is_zero() {
            return Err(SimError::ZeroDataRate { device });
        }
        dev.config.data_rate = rate;
        Ok(())
    }

    pub fn set_queue_capacity(
        &mut self,
        device: DeviceId,
        capacity: QueueCapacity,
    ) -> SimResult<()> {
        let dev = self.device_mut_or_err(device)?;
        dev.ensure_unlocked()?;
        dev.config.queue = capacity;
        dev.queue.set_capacity(capacity);
        Ok(())
    }

    pub fn set_mtu(&mut self, device: DeviceId, mtu: Option<u32>) -> SimResult<()> {
        let dev = self.device_mut_or_err(device)?;
        dev.ensure_unlocked()?;
        dev.config.mtu = mtu;
        Ok(())
    }

    /// Attach a receive-side error model. Unlike the transmit settings
    /// this may change mid-run.
    pub fn set_error_model(
        &mut self,
        device: DeviceId,
        model: Option<RateErrorModel>,
    ) -> SimResult<()> {
        let dev = self.device_mut_or_err(device)?;
        dev.error_model = model.map(ErrorModelState::new);
        Ok(())
    }

    /// Register the callback invoked for every packet delivered to
    /// `device`, replacing any previous one.
    pub fn set_receive_callback<F>(&mut self, device: DeviceId, callback: F) -> SimResult<()>
    where
        F: FnMut(&mut Simulator, DeviceId, Packet) + 'static,
    {
        let dev = self.device_mut_or_err(device)?;
        dev.receive = Some(Box::new(callback));
        dev.receive_epoch += 1;
        Ok(())
    }

    /// Changes whenever the receive callback is replaced or cleared.
    pub(crate) fn receive_epoch(&self, device: DeviceId) -> Option<u64> {
        self.device(device).map(|dev| dev.receive_epoch)
    }

    /// Remove the receive callback; later arrivals are dropped as
    /// `NoReceiver`.
    pub fn clear_receive_callback(&mut self, device: DeviceId) -> SimResult<()> {
        let dev = self.device_mut_or_err(device)?;
        dev.receive = None;
        dev.receive_epoch += 1;
        Ok(())
    }

    /// Queue `packet` for transmission on `device`.
    ///
    /// Returns `Err(DropReason)` when the packet is discarded; no event is
    /// scheduled in that case.
    ///
    /// # Panics
    /// Panics if `device` does not exist or is not attached to a channel.
    pub fn send(&mut self, device: DeviceId, mut packet: Packet) -> Result<(), DropReason> {
        let uid = self.network.next_packet_uid();
        packet.stamp(uid);
        let size = packet.size();

        let dev = self
            .network
            .devices
            .get_mut(device.index())
            .unwrap_or_else(|| {
                panic!("send({device}, {packet:?}): {}", SimError::UnknownDevice(device))
            });
        if dev.channel.is_none() {
            panic!(
                "send({device}, {packet:?}): {}",
                SimError::NoPeerAttached { device }
            );
        }
        dev.locked = true;

        if let Some(mtu) = dev.config.mtu {
            if size > mtu {
                let reason = DropReason::ExceedsMtu { size, mtu };
                self.drop_packet(device, &packet, reason);
                return Err(reason);
            }
        }
        if let Err(packet) = dev.queue.enqueue(packet) {
            self.drop_packet(device, &packet, DropReason::QueueFull);
            return Err(DropReason::QueueFull);
        }
        let start_now = !dev.transmitting;
        dev.transmitting = true;
        let rate = dev.config.data_rate;

        trace!(%device, uid, size, start_now, "enqueued");
        self.trace_packet(device, TraceKind::Enqueue, Some(uid), size);
        if start_now {
            self.schedule(rate.tx_time(size), move |sim| sim.transmit_complete(device));
        }
        Ok(())
    }

    /// The head packet has been fully clocked out: hand it to the channel
    /// and start on the next one.
    pub(crate) fn transmit_complete(&mut self, device: DeviceId) {
        let Some(dev) = self.network.devices.get_mut(device.index()) else {
            return;
        };
        let Some(packet) = dev.queue.dequeue() else {
            dev.transmitting = false;
            return;
        };
        dev.stats.tx_packets += 1;
        dev.stats.tx_bytes += u64::from(packet.size());
        let rate = dev.config.data_rate;
        let next_size = dev.queue.peek().map(Packet::size);
        if next_size.is_none() {
            dev.transmitting = false;
        }
        let channel = dev.channel;

        self.trace_packet(device, TraceKind::Dequeue, packet.uid(), packet.size());
        match channel {
            Some(channel) => self.channel_transmit(channel, device, packet),
            None => panic!("transmit_complete({device}): {}", SimError::NoPeerAttached { device }),
        }

        if let Some(size) = next_size {
            self.schedule(rate.tx_time(size), move |sim| sim.transmit_complete(device));
        }
    }

    /// Deliver `packet` to `device`: apply the error model, then invoke the
    /// receive callback, or drop if there is none.
    pub(crate) fn receive(&mut self, device: DeviceId, packet: Packet) {
        let Some(dev) = self.network.devices.get_mut(device.index()) else {
            return;
        };
        if let Some(model) = dev.error_model.as_mut() {
            if model.is_corrupt(&packet) {
                self.drop_packet(device, &packet, DropReason::ReceiveError);
                return;
            }
        }
        let Some(mut callback) = dev.receive.take() else {
            self.drop_packet(device, &packet, DropReason::NoReceiver);
            return;
        };
        dev.stats.rx_packets += 1;
        dev.stats.rx_bytes += u64::from(packet.size());
        let epoch = dev.receive_epoch;

        self.trace_packet(device, TraceKind::Receive, packet.uid(), packet.size());
        callback(self, device, packet);

        // Put the callback back unless it was replaced or cleared while
        // it ran.
        if let Some(dev) = self.network.devices.get_mut(device.index()) {
            if dev.receive_epoch == epoch {
                dev.receive = Some(callback);
            }
        }
    }

    /// Count, trace and report a dropped packet.
    pub(crate) fn drop_packet(&mut self, device: DeviceId, packet: &Packet, reason: DropReason) {
        if let Some(dev) = self.network.devices.get_mut(device.index()) {
            dev.count_drop(reason);
        }
        debug!(
            %device,
            uid = ?packet.uid(),
            size = packet.size(),
            %reason,
            now = %self.now(),
            "packet dropped"
        );
        self.trace_packet(device, TraceKind::Drop(reason), packet.uid(), packet.size());
    }
}
