//! Structured error types.
//!
//! `SimError` covers programming mistakes in topology setup and
//! scheduler misuse. Runtime network conditions (a full queue, a
//! corrupted frame) are not errors; they surface as
//! [`DropReason`](crate::net::DropReason) values instead.

use thiserror::Error;

use crate::net::{AddressError, AppId, ChannelId, DeviceId, NodeId};
use crate::time::Time;

/// Top-level error type for the simulation core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Scheduling errors ─────────────────────────────────

    /// A negative delay was passed to `schedule`.
    #[error("schedule(delay={delay}) called with a negative delay at now={now}")]
    InvalidDelay { delay: Time, now: Time },

    /// `now + delay` does not fit in the clock.
    #[error("schedule(delay={delay}) overflows the clock at now={now}")]
    TimeOverflow { delay: Time, now: Time },

    /// The scheduler has been torn down.
    #[error("schedule(delay={delay}) called after destroy()")]
    ScheduleAfterDestroy { delay: Time },

    #[error("run() called after destroy()")]
    RunAfterDestroy,

    #[error("run() called from inside a running event loop")]
    ReentrantRun,

    #[error("destroy() called from inside a running event loop")]
    DestroyWhileRunning,

    // ── Topology errors ───────────────────────────────────

    #[error("transmit on {device}: no peer device attached to its channel")]
    NoPeerAttached { device: DeviceId },

    #[error("attach({device}) to {channel}: point-to-point channel already has two devices")]
    ChannelFull { channel: ChannelId, device: DeviceId },

    #[error("attach({device}) to {channel}: device is already attached to {existing}")]
    DeviceAlreadyAttached {
        device: DeviceId,
        channel: ChannelId,
        existing: ChannelId,
    },

    #[error("{device}: configuration cannot change after the first send")]
    ConfigLocked { device: DeviceId },

    #[error("{device}: data rate must be greater than zero")]
    ZeroDataRate { device: DeviceId },

    // ── Lookup errors ─────────────────────────────────────

    #[error("node {0} not found")]
    UnknownNode(NodeId),

    #[error("device {0} not found")]
    UnknownDevice(DeviceId),

    #[error("channel {0} not found")]
    UnknownChannel(ChannelId),

    #[error("application {0} not found")]
    UnknownApp(AppId),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

/// Failure to parse a unit-carrying string such as `"5Mbps"` or `"2ms"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid number in {0:?}")]
    InvalidNumber(String),

    #[error("unknown unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },

    #[error("value out of range: {0:?}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_delay_names_call_and_arguments() {
        let e = SimError::InvalidDelay {
            delay: Time::millis(-5),
            now: Time::seconds(1),
        };
        let s = e.to_string();
        assert!(s.contains("schedule(delay=-0.005000000s)"), "{s}");
        assert!(s.contains("now=1.000000000s"), "{s}");
    }

    #[test]
    fn test_no_peer_display() {
        let e = SimError::NoPeerAttached {
            device: DeviceId::new(3),
        };
        assert_eq!(
            e.to_string(),
            "transmit on D3: no peer device attached to its channel"
        );
    }

    #[test]
    fn test_channel_full_display() {
        let e = SimError::ChannelFull {
            channel: ChannelId::new(0),
            device: DeviceId::new(2),
        };
        assert!(e.to_string().contains("already has two devices"));
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::RunAfterDestroy);
        assert!(!e.to_string().is_empty());
    }

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::UnknownUnit {
            input: "5parsecs".into(),
            unit: "parsecs".into(),
        };
        assert_eq!(e.to_string(), "unknown unit \"parsecs\" in \"5parsecs\"");
    }
}
