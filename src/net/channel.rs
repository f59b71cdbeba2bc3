//! Channels: the medium between devices.
//!
//! A channel is stateless beyond its propagation delay and the devices
//! attached to it. `transmit` schedules one receive event per peer,
//! `delay` after the sending device finished clocking the packet out.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::simulation::Simulator;
use crate::time::Time;

use super::id::{ChannelId, DeviceId};
use super::packet::Packet;

/// Topology of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Exactly two devices.
    #[default]
    PointToPoint,
    /// Any number of devices; every transmission reaches all the others.
    /// No carrier sense or collisions are modelled.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub delay: Time,
    pub kind: ChannelKind,
}

impl ChannelConfig {
    pub fn point_to_point(delay: Time) -> Self {
        ChannelConfig {
            delay,
            kind: ChannelKind::PointToPoint,
        }
    }

    pub fn shared(delay: Time) -> Self {
        ChannelConfig {
            delay,
            kind: ChannelKind::Shared,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::point_to_point(Time::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    config: ChannelConfig,
    devices: Vec<DeviceId>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, config: ChannelConfig) -> Self {
        Channel {
            id,
            config,
            devices: Vec::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.config.kind
    }

    pub fn delay(&self) -> Time {
        self.config.delay
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Every attached device except `from`.
    pub fn peers(&self, from: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied().filter(move |d| *d != from)
    }

    pub(crate) fn attach(&mut self, device: DeviceId) -> SimResult<()> {
        if self.config.kind == ChannelKind::PointToPoint && self.devices.len() >= 2 {
            return Err(SimError::ChannelFull {
                channel: self.id,
                device,
            });
        }
        self.devices.push(device);
        Ok(())
    }
}

impl Simulator {
    /// Set the propagation delay of `channel`.
    pub fn set_propagation_delay(&mut self, channel: ChannelId, delay: Time) -> SimResult<()> {
        if delay.is_negative() {
            return Err(SimError::InvalidDelay {
                delay,
                now: self.now(),
            });
        }
        let ch = self
            .network
            .channels
            .get_mut(channel.index())
            .ok_or(SimError::UnknownChannel(channel))?;
        ch.config.delay = delay;
        Ok(())
    }

    /// Hand `packet` from `from` to every peer on `channel`.
    ///
    /// # Panics
    /// Panics with `NoPeerAttached` if `from` is alone on the channel.
    pub(crate) fn channel_transmit(&mut self, channel: ChannelId, from: DeviceId, packet: Packet) {
        let Some(ch) = self.network.channels.get(channel.index()) else {
            panic!("transmit({channel}, {from}): {}", SimError::UnknownChannel(channel));
        };
        let delay = ch.delay();
        let peers: Vec<DeviceId> = ch.peers(from).collect();
        let Some((&last, rest)) = peers.split_last() else {
            panic!("transmit({channel}, {from}): {}", SimError::NoPeerAttached { device: from });
        };

        for &peer in rest {
            let copy = packet.clone();
            trace!(%channel, %from, to = %peer, uid = ?copy.uid(), "propagating");
            self.schedule(delay, move |sim| sim.receive(peer, copy));
        }
        trace!(%channel, %from, to = %last, uid = ?packet.uid(), "propagating");
        self.schedule(delay, move |sim| sim.receive(last, packet));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_to_point_accepts_two() {
        let config = ChannelConfig::point_to_point(Time::millis(2));
        let mut ch = Channel::new(ChannelId::new(0), config);
        ch.attach(DeviceId::new(0)).unwrap();
        ch.attach(DeviceId::new(1)).unwrap();
        let err = ch.attach(DeviceId::new(2)).unwrap_err();
        assert_eq!(
            err,
            SimError::ChannelFull {
                channel: ChannelId::new(0),
                device: DeviceId::new(2)
            }
        );
        assert_eq!(ch.devices().len(), 2);
    }

    #[test]
    fn test_shared_accepts_many() {
        let mut ch = Channel::new(ChannelId::new(1), ChannelConfig::shared(Time::ZERO));
        for i in 0..5 {
            ch.attach(DeviceId::new(i)).unwrap();
        }
        let peers: Vec<DeviceId> = ch.peers(DeviceId::new(2)).collect();
        assert_eq!(
            peers,
            vec![DeviceId::new(0), DeviceId::new(1), DeviceId::new(3), DeviceId::new(4)]
        );
    }

    #[test]
    fn test_config_deserializes_from_units() {
        let cfg: ChannelConfig = serde_yaml::from_str("delay: 2ms\nkind: shared").unwrap();
        assert_eq!(cfg, ChannelConfig::shared(Time::millis(2)));
        let cfg: ChannelConfig = serde_yaml::from_str("delay: 10us").unwrap();
        assert_eq!(cfg.kind, ChannelKind::PointToPoint);
    }
}
