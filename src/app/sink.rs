//! `PacketSink`: counts everything that arrives and never replies.

use std::any::Any;

use crate::net::Packet;
use crate::time::Time;

use super::{AppContext, Application};

#[derive(Debug, Clone, Default)]
pub struct PacketSink {
    packets: u64,
    bytes: u64,
    first_rx: Option<Time>,
    last_rx: Option<Time>,
}

impl PacketSink {
    pub fn new() -> Self {
        PacketSink::default()
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn first_rx(&self) -> Option<Time> {
        self.first_rx
    }

    pub fn last_rx(&self) -> Option<Time> {
        self.last_rx
    }

    /// Average goodput between the first and last arrival, in bits per
    /// second. `None` until two packets have arrived at different times.
    pub fn throughput_bps(&self) -> Option<f64> {
        let span = (self.last_rx? - self.first_rx?).as_secs_f64();
        (span > 0.0).then(|| self.bytes as f64 * 8.0 / span)
    }
}

impl Application for PacketSink {
    fn receive(&mut self, ctx: &mut AppContext<'_>, packet: Packet) {
        self.packets += 1;
        self.bytes += u64::from(packet.size());
        self.first_rx.get_or_insert(ctx.now());
        self.last_rx = Some(ctx.now());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
