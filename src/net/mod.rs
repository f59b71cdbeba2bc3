//! Topology: nodes, devices, channels and the packets that cross them.
//!
//! All entities live in flat arenas owned by [`Network`], which the
//! [`Simulator`] owns. Construction goes through `Simulator` methods so a
//! scheduled callback can both inspect the topology and send packets
//! through the same `&mut Simulator`.

pub mod address;
pub mod channel;
pub mod device;
pub mod error_model;
pub mod id;
pub mod node;
pub mod packet;
pub mod queue;

#[cfg(test)]
mod tests;

use std::net::Ipv4Addr;

use tracing::debug;

pub use address::{AddressError, Ipv4AddressAllocator};
pub use channel::{Channel, ChannelConfig, ChannelKind};
pub use device::{
    Device, DeviceConfig, DeviceStats, DropCounters, DropReason, ReceiveCallback, DEFAULT_MTU,
};
pub use error_model::{ErrorUnit, RateErrorModel};
pub use id::{AppId, ChannelId, DeviceId, NodeId};
pub use node::Node;
pub use packet::Packet;
pub use queue::{DropTailQueue, QueueCapacity, QueueStats};

use crate::error::{SimError, SimResult};
use crate::simulation::Simulator;

/// Arena storage for the topology.
#[derive(Debug, Default)]
pub(crate) struct Network {
    pub(crate) nodes: Vec<Node>,
    pub(crate) devices: Vec<Device>,
    pub(crate) channels: Vec<Channel>,
    next_uid: u64,
}

impl Network {
    pub(crate) fn new() -> Self {
        Network::default()
    }

    /// Packet uids start at 1 and are never reused within a run.
    pub(crate) fn next_packet_uid(&mut self) -> u64 {
        self.next_uid += 1;
        self.next_uid
    }

    pub(crate) fn set_address(&mut self, device: DeviceId, addr: Ipv4Addr) {
        if let Some(dev) = self.devices.get_mut(device.index()) {
            dev.address = Some(addr);
        }
    }

    /// Drop every entity. Ids handed out earlier become dangling.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.devices.clear();
        self.channels.clear();
    }
}

impl Simulator {
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId::from_index(self.network.nodes.len());
        self.network.nodes.push(Node::new(id));
        debug!(node = %id, "node created");
        id
    }

    /// Install a new device on `node`. Its index on the node is the number
    /// of devices installed before it.
    pub fn add_device(&mut self, node: NodeId, config: DeviceConfig) -> SimResult<DeviceId> {
        let id = DeviceId::from_index(self.network.devices.len());
        if config.data_rate.is_zero() {
            return Err(SimError::ZeroDataRate { device: id });
        }
        let n = self
            .network
            .nodes
            .get_mut(node.index())
            .ok_or(SimError::UnknownNode(node))?;
        let index_on_node = n.add_device(id);
        debug!(%node, device = %id, index_on_node, rate = %config.data_rate, "device added");
        self.network
            .devices
            .push(Device::new(id, node, index_on_node, config));
        Ok(id)
    }

    pub fn create_channel(&mut self, config: ChannelConfig) -> ChannelId {
        let id = ChannelId::from_index(self.network.channels.len());
        debug!(channel = %id, kind = ?config.kind, delay = %config.delay, "channel created");
        self.network.channels.push(Channel::new(id, config));
        id
    }

    /// Attach `device` to `channel`. A device belongs to at most one channel.
    pub fn attach(&mut self, channel: ChannelId, device: DeviceId) -> SimResult<()> {
        let dev = self
            .network
            .devices
            .get(device.index())
            .ok_or(SimError::UnknownDevice(device))?;
        if let Some(existing) = dev.channel {
            return Err(SimError::DeviceAlreadyAttached {
                device,
                channel,
                existing,
            });
        }
        self.network
            .channels
            .get_mut(channel.index())
            .ok_or(SimError::UnknownChannel(channel))?
            .attach(device)?;
        self.network.devices[device.index()].channel = Some(channel);
        debug!(%channel, %device, "device attached");
        Ok(())
    }

    /// Attach both ends of a point-to-point link.
    pub fn connect(&mut self, channel: ChannelId, a: DeviceId, b: DeviceId) -> SimResult<()> {
        self.attach(channel, a)?;
        self.attach(channel, b)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.network.nodes.get(id.index())
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.network.devices.get(id.index())
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.network.channels.get(id.index())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.network.nodes
    }

    pub fn devices(&self) -> &[Device] {
        &self.network.devices
    }

    pub fn channels(&self) -> &[Channel] {
        &self.network.channels
    }

    /// The device that was assigned `addr`, if any.
    pub fn device_by_address(&self, addr: Ipv4Addr) -> Option<DeviceId> {
        self.network
            .devices
            .iter()
            .find(|d| d.address() == Some(addr))
            .map(Device::id)
    }

    /// The device on the far side of `device`'s point-to-point channel.
    pub fn peer_of(&self, device: DeviceId) -> Option<DeviceId> {
        let channel = self.device(device)?.channel()?;
        let mut peers = self.channel(channel)?.peers(device);
        let peer = peers.next()?;
        peers.next().is_none().then_some(peer)
    }
}
