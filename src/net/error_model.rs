//! Receive-side packet corruption.
//!
//! A `RateErrorModel` attached to a device marks arriving packets as
//! corrupt with a fixed probability, per packet or per byte/bit. The
//! draw comes from a seeded ChaCha stream, so a given seed corrupts the
//! same packets on every run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::packet::Packet;

/// Unit the error rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorUnit {
    #[default]
    Packet,
    Byte,
    Bit,
}

/// Configuration for a rate-based error model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateErrorModel {
    /// Probability of one unit being corrupt, in `[0.0, 1.0]`.
    pub rate: f64,
    #[serde(default)]
    pub unit: ErrorUnit,
    #[serde(default)]
    pub seed: u64,
}

impl RateErrorModel {
    pub fn per_packet(rate: f64, seed: u64) -> Self {
        RateErrorModel {
            rate,
            unit: ErrorUnit::Packet,
            seed,
        }
    }

    pub fn per_byte(rate: f64, seed: u64) -> Self {
        RateErrorModel {
            rate,
            unit: ErrorUnit::Byte,
            seed,
        }
    }

    /// Probability that a whole packet of `size` bytes is corrupt.
    pub fn packet_error_probability(&self, size: u32) -> f64 {
        let rate = self.rate.clamp(0.0, 1.0);
        let units = match self.unit {
            ErrorUnit::Packet => return rate,
            ErrorUnit::Byte => f64::from(size),
            ErrorUnit::Bit => f64::from(size) * 8.0,
        };
        1.0 - (1.0 - rate).powf(units)
    }
}

/// A configured model plus its random stream.
#[derive(Debug, Clone)]
pub(crate) struct ErrorModelState {
    model: RateErrorModel,
    rng: ChaCha8Rng,
}

impl ErrorModelState {
    pub(crate) fn new(model: RateErrorModel) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(model.seed);
        ErrorModelState { model, rng }
    }

    pub(crate) fn model(&self) -> &RateErrorModel {
        &self.model
    }

    /// Draw once and decide whether `packet` arrives corrupt.
    pub(crate) fn is_corrupt(&mut self, packet: &Packet) -> bool {
        let p = self.model.packet_error_probability(packet.size());
        if p <= 0.0 {
            return false;
        }
        self.rng.gen::<f64>() < p
    }
}
