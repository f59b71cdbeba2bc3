use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use linksim::config::{ConfigError, ScenarioConfig};
use linksim::scenario::run_echo;
use linksim::{DataRate, SimError, Time};

/// Two nodes, one point-to-point link, an echo client and server.
#[derive(Debug, Parser)]
#[command(name = "linksim", version, about)]
struct Cli {
    /// YAML scenario file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Packets the client sends (0 = until it stops).
    #[arg(long)]
    packets: Option<u32>,

    /// Gap between client sends, e.g. `1s` or `250ms`.
    #[arg(long)]
    interval: Option<Time>,

    /// Client packet size in bytes.
    #[arg(long)]
    packet_size: Option<u32>,

    /// Link rate, e.g. `5Mbps`.
    #[arg(long)]
    data_rate: Option<DataRate>,

    /// Propagation delay, e.g. `2ms`.
    #[arg(long)]
    delay: Option<Time>,

    /// Write an ASCII packet trace to this file.
    #[arg(long)]
    ascii_trace: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("writing trace to {path}: {source}")]
    Trace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Cli {
    fn scenario(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => ScenarioConfig::from_file(path)?,
            None => ScenarioConfig::default(),
        };
        if let Some(n) = self.packets {
            cfg.client.max_packets = n;
        }
        if let Some(interval) = self.interval {
            cfg.client.interval = interval;
        }
        if let Some(size) = self.packet_size {
            cfg.client.packet_size = size;
        }
        if let Some(rate) = self.data_rate {
            cfg.link.device.data_rate = rate;
        }
        if let Some(delay) = self.delay {
            cfg.link.channel.delay = delay;
        }
        if self.ascii_trace.is_some() {
            cfg.trace = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let cfg = cli.scenario()?;
    let report = run_echo(&cfg)?;
    println!("{report}");

    if let (Some(path), Some(trace)) = (&cli.ascii_trace, &report.trace) {
        trace.write_ascii_to_file(path).map_err(|source| CliError::Trace {
            path: path.clone(),
            source,
        })?;
        println!("trace: {} entries, digest {:016x}", trace.len(), trace.digest());
    }
    Ok(())
}
