//! Virtual time for the simulation.
//!
//! `Time` is a signed nanosecond count. It doubles as an absolute
//! timestamp (nanoseconds since the start of the run) and as a delay.
//! The value is signed so that a negative delay is representable and
//! can be rejected loudly instead of wrapping.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in, or a span of, simulated time at nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Time(i64);

impl Time {
    /// The zero-point of simulation time.
    pub const ZERO: Time = Time(0);

    /// The largest representable time.
    pub const MAX: Time = Time(i64::MAX);

    #[inline]
    pub const fn nanos(ns: i64) -> Self {
        Time(ns)
    }

    #[inline]
    pub const fn micros(us: i64) -> Self {
        Time(us * NANOS_PER_MICRO)
    }

    #[inline]
    pub const fn millis(ms: i64) -> Self {
        Time(ms * NANOS_PER_MILLI)
    }

    #[inline]
    pub const fn seconds(s: i64) -> Self {
        Time(s * NANOS_PER_SEC)
    }

    /// Fractional seconds, rounded to the nearest nanosecond.
    pub fn from_secs_f64(s: f64) -> Self {
        Time((s * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_MILLI as f64
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Returns `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Time) -> Option<Time> {
        self.0.checked_add(other.0).map(Time)
    }

    #[inline]
    pub fn checked_sub(self, other: Time) -> Option<Time> {
        self.0.checked_sub(other.0).map(Time)
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let secs = abs / NANOS_PER_SEC as u64;
        let frac = abs % NANOS_PER_SEC as u64;
        write!(f, "{}{}.{:09}s", sign, secs, frac)
    }
}

impl FromStr for Time {
    type Err = ParseError;

    /// Parses values such as `2ms`, `1.5s`, `10us`, `100ns` or `3min`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_unit(s)?;
        let scale: i64 = match unit {
            "ns" => 1,
            "us" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" | "" => NANOS_PER_SEC,
            "min" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            other => {
                return Err(ParseError::UnknownUnit {
                    input: s.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        if let Ok(whole) = value.parse::<i64>() {
            return whole
                .checked_mul(scale)
                .map(Time)
                .ok_or_else(|| ParseError::OutOfRange(s.to_string()));
        }
        let v: f64 = value
            .parse()
            .map_err(|_| ParseError::InvalidNumber(s.to_string()))?;
        let ns = (v * scale as f64).round();
        if !ns.is_finite() || ns.abs() > i64::MAX as f64 {
            return Err(ParseError::OutOfRange(s.to_string()));
        }
        Ok(Time(ns as i64))
    }
}

impl TryFrom<String> for Time {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Time> for String {
    fn from(t: Time) -> String {
        t.to_string()
    }
}

/// Split `"12.5ms"` into `("12.5", "ms")`.
pub(crate) fn split_unit(s: &str) -> Result<(&str, &str), ParseError> {
    let s = s.trim();
    let idx = s
        .find(|c: char| c.is_ascii_alphabetic() || c == '/')
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(idx);
    let value = value.trim();
    if value.is_empty() {
        return Err(ParseError::InvalidNumber(s.to_string()));
    }
    Ok((value, unit.trim()))
}
