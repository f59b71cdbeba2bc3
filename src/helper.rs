//! Fluent helpers for topology setup.
//!
//! Thin wrappers over `create_node` / `add_device` / `create_channel` /
//! `attach` that hide the boilerplate of wiring up common link shapes.
//! They hold only configuration, so one helper can install any number of
//! identical links.
//!
//! # Example
//! ```rust
//! use linksim::helper::{create_nodes, PointToPointHelper};
//! use linksim::{DataRate, Simulator, Time};
//!
//! let mut sim = Simulator::new();
//! let nodes = create_nodes(&mut sim, 2);
//! let (a, b) = PointToPointHelper::new()
//!     .data_rate(DataRate::mbps(5))
//!     .delay(Time::millis(2))
//!     .install(&mut sim, nodes[0], nodes[1])
//!     .unwrap();
//! assert_eq!(sim.peer_of(a), Some(b));
//! ```

use crate::error::SimResult;
use crate::net::{
    ChannelConfig, ChannelKind, DeviceConfig, DeviceId, NodeId, QueueCapacity, RateErrorModel,
};
use crate::rate::DataRate;
use crate::simulation::Simulator;
use crate::time::Time;

/// Create `n` nodes and return their ids in creation order.
pub fn create_nodes(sim: &mut Simulator, n: usize) -> Vec<NodeId> {
    (0..n).map(|_| sim.create_node()).collect()
}

// ── Point-to-point ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PointToPointHelper {
    device: DeviceConfig,
    delay: Time,
    /// Applied to the receiving side of both devices.
    error_model: Option<RateErrorModel>,
}

impl PointToPointHelper {
    pub fn new() -> Self {
        PointToPointHelper::default()
    }

    /// Start from a full device and channel configuration.
    pub fn from_config(device: DeviceConfig, channel: &ChannelConfig) -> Self {
        PointToPointHelper {
            device,
            delay: channel.delay,
            error_model: None,
        }
    }

    pub fn data_rate(mut self, rate: DataRate) -> Self {
        self.device.data_rate = rate;
        self
    }

    pub fn delay(mut self, delay: Time) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue(mut self, capacity: QueueCapacity) -> Self {
        self.device.queue = capacity;
        self
    }

    pub fn mtu(mut self, mtu: Option<u32>) -> Self {
        self.device.mtu = mtu;
        self
    }

    pub fn error_model(mut self, model: Option<RateErrorModel>) -> Self {
        self.error_model = model;
        self
    }

    /// Add one device to each of `a` and `b` and join them with a new
    /// point-to-point channel.
    pub fn install(
        &self,
        sim: &mut Simulator,
        a: NodeId,
        b: NodeId,
    ) -> SimResult<(DeviceId, DeviceId)> {
        let da = sim.add_device(a, self.device.clone())?;
        let db = sim.add_device(b, self.device.clone())?;
        let channel = sim.create_channel(ChannelConfig::point_to_point(self.delay));
        sim.connect(channel, da, db)?;
        if let Some(model) = &self.error_model {
            sim.set_error_model(da, Some(model.clone()))?;
            sim.set_error_model(db, Some(model.clone()))?;
        }
        Ok((da, db))
    }
}

// ── Shared bus ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SharedBusHelper {
    device: DeviceConfig,
    delay: Time,
}

impl SharedBusHelper {
    pub fn new() -> Self {
        SharedBusHelper::default()
    }

    pub fn data_rate(mut self, rate: DataRate) -> Self {
        self.device.data_rate = rate;
        self
    }

    pub fn delay(mut self, delay: Time) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue(mut self, capacity: QueueCapacity) -> Self {
        self.device.queue = capacity;
        self
    }

    /// Add one device per node, all on a single shared channel. Device
    /// order follows `nodes`.
    pub fn install(&self, sim: &mut Simulator, nodes: &[NodeId]) -> SimResult<Vec<DeviceId>> {
        let channel = sim.create_channel(ChannelConfig {
            delay: self.delay,
            kind: ChannelKind::Shared,
        });
        nodes
            .iter()
            .map(|&node| {
                let device = sim.add_device(node, self.device.clone())?;
                sim.attach(channel, device)?;
                Ok(device)
            })
            .collect()
    }
}
