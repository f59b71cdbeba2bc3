//! # linksim: deterministic packet-level network simulation
//!
//! A discrete-event simulation core for packet networks. A virtual clock
//! advances only when the scheduler fires the next event; devices model
//! serialization delay and bounded transmit queues; channels model
//! propagation delay. No threads, no async, no wall-clock time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │              Simulator               │ ← owns everything, run loop
//! │  ┌────────────┐   ┌───────────────┐  │
//! │  │ Scheduler  │   │    Network    │  │
//! │  │ EventQueue │   │ nodes/devices │  │ ← index-based arenas
//! │  │   Time     │   │   channels    │  │
//! │  └────────────┘   └───────────────┘  │
//! │  ┌────────────┐   ┌───────────────┐  │
//! │  │    apps    │   │   TraceLog    │  │
//! │  └────────────┘   └───────────────┘  │
//! └──────────────────────────────────────┘
//! ```
//!
//! Every event is a closure taking `&mut Simulator`, so callbacks can
//! read the clock, send packets and schedule more work directly.
//!
//! ```rust
//! use linksim::helper::PointToPointHelper;
//! use linksim::{DataRate, Packet, Simulator, Time};
//!
//! let mut sim = Simulator::new();
//! let (a, b) = (sim.create_node(), sim.create_node());
//! let (da, db) = PointToPointHelper::new()
//!     .data_rate(DataRate::mbps(5))
//!     .delay(Time::millis(2))
//!     .install(&mut sim, a, b)
//!     .unwrap();
//! sim.set_receive_callback(db, |sim, _dev, packet| {
//!     assert_eq!(packet.size(), 1024);
//!     assert_eq!(sim.now(), Time::nanos(3_638_400));
//! })
//! .unwrap();
//! sim.send(da, Packet::new(1024)).unwrap();
//! sim.run();
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod helper;
pub mod net;
pub mod queue;
pub mod rate;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use app::{AppContext, Application, EchoClient, EchoServer, OnOffApplication, PacketSink};
pub use error::{ParseError, SimError, SimResult};
pub use event::{EventHandle, EventId, EventState};
pub use net::{
    AppId, ChannelConfig, ChannelId, ChannelKind, DeviceConfig, DeviceId, DropReason, NodeId,
    Packet, QueueCapacity, RateErrorModel,
};
pub use rate::DataRate;
pub use scheduler::{SchedulerState, StopReason};
pub use simulation::Simulator;
pub use time::Time;
pub use trace::{TraceEvent, TraceKind, TraceLog};
