//! IPv4 address allocation over device lists.
//!
//! Hands out consecutive host addresses within a subnet, in the order the
//! devices are given. Routing is out of scope; the address is recorded on
//! the device so applications and tests can look peers up by it.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::simulation::Simulator;

use super::id::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("mask {0} is not a contiguous prefix")]
    InvalidMask(Ipv4Addr),

    #[error("subnet {network}/{mask} has no free host addresses")]
    Exhausted { network: Ipv4Addr, mask: Ipv4Addr },

    #[error("subnet space above {0} is exhausted")]
    NoNextNetwork(Ipv4Addr),

    #[error("device {0} not found")]
    UnknownDevice(DeviceId),
}

/// Sequential allocator for one subnet at a time.
#[derive(Debug, Clone)]
pub struct Ipv4AddressAllocator {
    network: u32,
    mask: u32,
    next_host: u32,
}

impl Ipv4AddressAllocator {
    /// Start allocating at host `.1` of `network/mask`.
    pub fn new(network: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, AddressError> {
        let m = u32::from(mask);
        // A contiguous prefix has all its one bits before any zero bit.
        if m.leading_ones() + m.trailing_zeros() != 32 {
            return Err(AddressError::InvalidMask(mask));
        }
        Ok(Ipv4AddressAllocator {
            network: u32::from(network) & m,
            mask: m,
            next_host: 1,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask)
    }

    /// Hand out the next host address without binding it to a device.
    pub fn next_address(&mut self) -> Result<Ipv4Addr, AddressError> {
        let broadcast = !self.mask;
        if self.next_host >= broadcast {
            return Err(AddressError::Exhausted {
                network: self.network(),
                mask: self.mask(),
            });
        }
        let addr = Ipv4Addr::from(self.network | self.next_host);
        self.next_host += 1;
        Ok(addr)
    }

    /// Advance to the next subnet of the same size and restart at `.1`.
    pub fn new_network(&mut self) -> Result<Ipv4Addr, AddressError> {
        let step = (!self.mask).wrapping_add(1);
        self.network = self
            .network
            .checked_add(step)
            .ok_or(AddressError::NoNextNetwork(self.network()))?;
        self.next_host = 1;
        Ok(self.network())
    }

    /// Assign one address per device, in order, recording each on its device.
    pub fn assign(
        &mut self,
        sim: &mut Simulator,
        devices: &[DeviceId],
    ) -> Result<Vec<Ipv4Addr>, AddressError> {
        let mut assigned = Vec::with_capacity(devices.len());
        for &device in devices {
            if sim.device(device).is_none() {
                return Err(AddressError::UnknownDevice(device));
            }
            let addr = self.next_address()?;
            sim.network.set_address(device, addr);
            assigned.push(addr);
        }
        Ok(assigned)
    }
}
