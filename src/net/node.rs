//! Node: an addressable host that owns an ordered list of devices.

use super::id::{DeviceId, NodeId};

/// A simulated host. Purely a composition root: it has no scheduling
/// behaviour, only the devices installed on it, in installation order.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    devices: Vec<DeviceId>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Node {
            id,
            devices: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Devices in installation order; the position is the device index.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// The device at `index`, as numbered by installation order.
    pub fn device(&self, index: usize) -> Option<DeviceId> {
        self.devices.get(index).copied()
    }

    pub fn device_index(&self, device: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| *d == device)
    }

    /// Append a device and return its index on this node.
    pub(crate) fn add_device(&mut self, device: DeviceId) -> usize {
        self.devices.push(device);
        self.devices.len() - 1
    }
}
