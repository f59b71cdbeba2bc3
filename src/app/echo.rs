//! Echo client and server.
//!
//! The client sends `max_packets` fixed-size packets, one every
//! `interval`, each tagged with a sequence number, and measures the round
//! trip of every echo it gets back. The server sends each packet it
//! receives back out of the device it arrived on.

use std::any::Any;
use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, info};

use crate::event::EventHandle;
use crate::net::Packet;
use crate::time::Time;

use super::{AppContext, Application};

const SEND_TIMER: u64 = 0;

// ── Server ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EchoServer {
    pub received: u64,
    pub echoed: u64,
    /// Echoes the local device refused (queue full, MTU).
    pub refused: u64,
}

impl EchoServer {
    pub fn new() -> Self {
        EchoServer::default()
    }
}

impl Application for EchoServer {
    fn receive(&mut self, ctx: &mut AppContext<'_>, packet: Packet) {
        self.received += 1;
        info!(node = %ctx.node(), size = packet.size(), now = %ctx.now(), "server received");
        match ctx.send(packet.reply()) {
            Ok(()) => self.echoed += 1,
            Err(reason) => {
                self.refused += 1;
                debug!(node = %ctx.node(), %reason, "echo not sent");
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EchoClient {
    /// Zero sends until the app is stopped.
    max_packets: u32,
    interval: Time,
    packet_size: u32,
    sent: u32,
    received: u32,
    refused: u32,
    pending: Option<EventHandle>,
    in_flight: BTreeMap<u32, Time>,
    rtts: Vec<Time>,
}

impl EchoClient {
    pub fn new(max_packets: u32, interval: Time, packet_size: u32) -> Self {
        EchoClient {
            max_packets,
            interval,
            packet_size,
            sent: 0,
            received: 0,
            refused: 0,
            pending: None,
            in_flight: BTreeMap::new(),
            rtts: Vec::new(),
        }
    }

    /// Packets handed to the device, including refused ones.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn refused(&self) -> u32 {
        self.refused
    }

    /// Sent packets whose echo has not come back yet.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    /// Round-trip times of matched echoes, in arrival order.
    pub fn rtts(&self) -> &[Time] {
        &self.rtts
    }

    fn has_more(&self) -> bool {
        self.max_packets == 0 || self.sent < self.max_packets
    }

    fn send_next(&mut self, ctx: &mut AppContext<'_>) {
        let seq = self.sent;
        self.sent += 1;

        let mut tag = BytesMut::with_capacity(4);
        tag.put_u32(seq);
        let packet = Packet::with_payload(self.packet_size, tag.freeze());
        info!(node = %ctx.node(), seq, size = packet.size(), now = %ctx.now(), "client sent");
        match ctx.send(packet) {
            Ok(()) => {
                self.in_flight.insert(seq, ctx.now());
            }
            Err(reason) => {
                self.refused += 1;
                debug!(node = %ctx.node(), seq, %reason, "send refused");
            }
        }

        self.pending = self
            .has_more()
            .then(|| ctx.schedule_timer(self.interval, SEND_TIMER));
    }
}

impl Application for EchoClient {
    fn start(&mut self, ctx: &mut AppContext<'_>) {
        if self.has_more() {
            self.pending = Some(ctx.schedule_timer(Time::ZERO, SEND_TIMER));
        }
    }

    fn stop(&mut self, ctx: &mut AppContext<'_>) {
        if let Some(handle) = self.pending.take() {
            ctx.cancel(&handle);
        }
        // Echoes still outstanding can no longer be matched.
        self.in_flight.clear();
    }

    fn timer(&mut self, ctx: &mut AppContext<'_>, token: u64) {
        if token == SEND_TIMER {
            self.pending = None;
            self.send_next(ctx);
        }
    }

    fn receive(&mut self, ctx: &mut AppContext<'_>, packet: Packet) {
        self.received += 1;
        let mut payload = packet.payload().clone();
        if payload.remaining() >= 4 {
            let seq = payload.get_u32();
            if let Some(sent_at) = self.in_flight.remove(&seq) {
                self.rtts.push(ctx.now() - sent_at);
            }
        }
        info!(node = %ctx.node(), size = packet.size(), now = %ctx.now(), "client received echo");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::PointToPointHelper;
    use crate::net::{DeviceId, RateErrorModel};
    use crate::rate::DataRate;
    use crate::simulation::Simulator;

    fn echo_pair(
        client: EchoClient,
        client_stop: Option<Time>,
    ) -> (Simulator, crate::net::AppId, crate::net::AppId) {
        let mut sim = Simulator::new();
        let (a, b) = (sim.create_node(), sim.create_node());
        let (da, db) = PointToPointHelper::new()
            .data_rate(DataRate::mbps(5))
            .delay(Time::millis(2))
            .install(&mut sim, a, b)
            .unwrap();
        let server = EchoServer::new();
        let server = sim
            .install_app(db, Box::new(server), Time::seconds(1), Some(Time::seconds(10)))
            .unwrap();
        let client = sim
            .install_app(da, Box::new(client), Time::seconds(2), client_stop)
            .unwrap();
        (sim, client, server)
    }

    #[test]
    fn test_single_echo_round_trip() {
        let client = EchoClient::new(1, Time::seconds(1), 1024);
        let (mut sim, client, server) = echo_pair(client, Some(Time::seconds(10)));
        sim.run();

        let c = sim.app::<EchoClient>(client).unwrap();
        let s = sim.app::<EchoServer>(server).unwrap();
        assert_eq!(c.sent(), 1);
        assert_eq!(c.received(), 1);
        assert_eq!(s.echoed, 1);
        // Two hops of 1024 bytes at 5Mbps plus 2ms each way.
        assert_eq!(c.rtts(), &[Time::nanos(2 * 3_638_400)]);
    }

    #[test]
    fn test_client_sends_max_packets_at_interval() {
        let (mut sim, client, _) = echo_pair(EchoClient::new(3, Time::millis(500), 64), None);
        sim.run();
        let c = sim.app::<EchoClient>(client).unwrap();
        assert_eq!(c.sent(), 3);
        assert_eq!(c.received(), 3);
        assert_eq!(c.rtts().len(), 3);
        assert!(c.rtts().windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_stop_cancels_pending_send() {
        // Unlimited client, stopped at 4.5s: sends at 2, 3, 4.
        let client = EchoClient::new(0, Time::seconds(1), 100);
        let (mut sim, client, _) = echo_pair(client, Some(Time::millis(4500)));
        sim.run();
        let c = sim.app::<EchoClient>(client).unwrap();
        assert_eq!(c.sent(), 3);
        assert_eq!(sim.pending_events(), 0);
        assert!(sim.now() <= Time::seconds(10));
    }

    #[test]
    fn test_stop_forgets_lost_echoes() {
        let client = EchoClient::new(0, Time::seconds(1), 100);
        let (mut sim, client, server) = echo_pair(client, Some(Time::millis(5500)));
        // Every request is corrupted on arrival at the server.
        let server_dev = DeviceId::new(1);
        sim.set_error_model(server_dev, Some(RateErrorModel::per_packet(1.0, 1)))
            .unwrap();
        sim.stop_after(Time::seconds(5)).unwrap();
        sim.run();

        let c = sim.app::<EchoClient>(client).unwrap();
        assert_eq!(c.sent(), 4);
        assert_eq!(c.received(), 0);
        assert_eq!(c.outstanding(), 4);
        assert_eq!(sim.app::<EchoServer>(server).unwrap().received, 0);

        sim.run();
        let c = sim.app::<EchoClient>(client).unwrap();
        assert_eq!(c.sent(), 4);
        assert_eq!(c.outstanding(), 0);
    }
}
