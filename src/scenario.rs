//! The canonical two-node echo scenario, driven from a [`ScenarioConfig`].

use std::fmt;

use tracing::info;

use crate::app::{EchoClient, EchoServer};
use crate::config::ScenarioConfig;
use crate::error::{SimError, SimResult};
use crate::helper::{create_nodes, PointToPointHelper};
use crate::net::{DeviceId, DeviceStats, Ipv4AddressAllocator};
use crate::simulation::Simulator;
use crate::time::Time;
use crate::trace::TraceLog;

/// What an echo run produced.
#[derive(Debug, Clone)]
pub struct EchoReport {
    pub client_sent: u32,
    pub client_received: u32,
    pub server_received: u64,
    pub server_echoed: u64,
    pub rtts: Vec<Time>,
    pub client_device: DeviceStats,
    pub server_device: DeviceStats,
    pub final_time: Time,
    pub events_processed: u64,
    /// Present when the scenario asked for tracing.
    pub trace: Option<TraceLog>,
}

impl EchoReport {
    pub fn trace_digest(&self) -> Option<u64> {
        self.trace.as_ref().map(TraceLog::digest)
    }
}

impl fmt::Display for EchoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "client: sent {} received {}", self.client_sent, self.client_received)?;
        writeln!(f, "server: received {} echoed {}", self.server_received, self.server_echoed)?;
        for (i, rtt) in self.rtts.iter().enumerate() {
            writeln!(f, "  rtt[{i}] = {:.4}ms", rtt.as_millis_f64())?;
        }
        for (name, stats) in [("client", &self.client_device), ("server", &self.server_device)] {
            writeln!(
                f,
                "{name} device: tx {} pkts / {} B, rx {} pkts / {} B, drops {}",
                stats.tx_packets, stats.tx_bytes, stats.rx_packets, stats.rx_bytes,
                stats.drops.total()
            )?;
        }
        write!(f, "finished at {} after {} events", self.final_time, self.events_processed)
    }
}

/// Build the two-node topology, install the echo pair, and run.
pub fn run_echo(cfg: &ScenarioConfig) -> SimResult<EchoReport> {
    let mut sim = Simulator::new();
    if cfg.trace {
        sim.enable_tracing();
    }

    let nodes = create_nodes(&mut sim, 2);
    let (client_dev, server_dev) =
        PointToPointHelper::from_config(cfg.link.device.clone(), &cfg.link.channel)
            .error_model(cfg.link.error_model.clone())
            .install(&mut sim, nodes[0], nodes[1])?;

    let mut addresses = Ipv4AddressAllocator::new([10, 1, 1, 0].into(), [255, 255, 255, 0].into())?;
    let assigned = addresses.assign(&mut sim, &[client_dev, server_dev])?;
    info!(client = %assigned[0], server = %assigned[1], "addresses assigned");

    let server = Box::new(EchoServer::new());
    let server = sim.install_app(server_dev, server, cfg.server.start, cfg.server.stop)?;
    let client = Box::new(EchoClient::new(
        cfg.client.max_packets,
        cfg.client.interval,
        cfg.client.packet_size,
    ));
    let client = sim.install_app(client_dev, client, cfg.client.start, cfg.client.stop)?;

    if let Some(t) = cfg.stop_time {
        sim.stop_after(t)?;
    }
    sim.run();

    let c = sim.app::<EchoClient>(client).ok_or(SimError::UnknownApp(client))?;
    let s = sim.app::<EchoServer>(server).ok_or(SimError::UnknownApp(server))?;
    let device_stats = |d: DeviceId| {
        sim.device(d)
            .map(|dev| dev.stats())
            .ok_or(SimError::UnknownDevice(d))
    };
    let report = EchoReport {
        client_sent: c.sent(),
        client_received: c.received(),
        server_received: s.received,
        server_echoed: s.echoed,
        rtts: c.rtts().to_vec(),
        client_device: device_stats(client_dev)?,
        server_device: device_stats(server_dev)?,
        final_time: sim.now(),
        events_processed: sim.events_processed(),
        trace: sim.take_trace_log(),
    };
    sim.destroy()?;
    Ok(report)
}
