//! Link data rates and serialization delay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::time::{split_unit, Time};

/// A transmission rate in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    #[inline]
    pub const fn bps(bits_per_sec: u64) -> Self {
        DataRate(bits_per_sec)
    }

    #[inline]
    pub const fn kbps(k: u64) -> Self {
        DataRate(k * 1_000)
    }

    #[inline]
    pub const fn mbps(m: u64) -> Self {
        DataRate(m * 1_000_000)
    }

    #[inline]
    pub const fn gbps(g: u64) -> Self {
        DataRate(g * 1_000_000_000)
    }

    #[inline]
    pub const fn bits_per_sec(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Time to clock `bytes` onto the wire, rounded to the nearest
    /// nanosecond. A zero rate never finishes and yields `Time::MAX`.
    pub fn tx_time(self, bytes: u32) -> Time {
        self.tx_time_bits(u64::from(bytes) * 8)
    }

    pub fn tx_time_bits(self, bits: u64) -> Time {
        if self.0 == 0 {
            return Time::MAX;
        }
        let bps = u128::from(self.0);
        let ns = (u128::from(bits) * 1_000_000_000 + bps / 2) / bps;
        i64::try_from(ns).map(Time::nanos).unwrap_or(Time::MAX)
    }
}

impl Default for DataRate {
    /// 32768 bps, the classic point-to-point device default.
    fn default() -> Self {
        DataRate(32_768)
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.0;
        if bps >= 1_000_000_000 && bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps >= 1_000_000 && bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps >= 1_000 && bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{}bps", bps)
        }
    }
}

impl FromStr for DataRate {
    type Err = ParseError;

    /// Accepts bit units (`bps`, `kbps`, `Mbps`, `Gbps`, `b/s` forms) and
    /// byte units (`Bps`, `KBps`, `MB/s` ...). A bare number is bits/s.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_unit(s)?;
        let scale: u64 = match unit {
            "" | "bps" | "b/s" => 1,
            "kbps" | "Kbps" | "kb/s" | "Kb/s" => 1_000,
            "Mbps" | "mbps" | "Mb/s" => 1_000_000,
            "Gbps" | "gbps" | "Gb/s" => 1_000_000_000,
            "Bps" | "B/s" => 8,
            "KBps" | "kBps" | "KB/s" | "kB/s" => 8_000,
            "MBps" | "MB/s" => 8_000_000,
            "GBps" | "GB/s" => 8_000_000_000,
            other => {
                return Err(ParseError::UnknownUnit {
                    input: s.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        if let Ok(whole) = value.parse::<u64>() {
            return whole
                .checked_mul(scale)
                .map(DataRate)
                .ok_or_else(|| ParseError::OutOfRange(s.to_string()));
        }
        let v: f64 = value
            .parse()
            .map_err(|_| ParseError::InvalidNumber(s.to_string()))?;
        let bps = (v * scale as f64).round();
        if !bps.is_finite() || bps < 0.0 || bps > u64::MAX as f64 {
            return Err(ParseError::OutOfRange(s.to_string()));
        }
        Ok(DataRate(bps as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataRate> for String {
    fn from(r: DataRate) -> String {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_time_exact() {
        // 1024 bytes at 5 Mbps.
        assert_eq!(DataRate::mbps(5).tx_time(1024), Time::nanos(1_638_400));
        assert_eq!(DataRate::gbps(1).tx_time(125), Time::micros(1));
    }

    #[test]
    fn test_tx_time_rounds_to_nearest() {
        // 1 bit at 3 bps = 333_333_333.33 ns.
        assert_eq!(DataRate::bps(3).tx_time_bits(1), Time::nanos(333_333_333));
        // 2 bits at 3 bps = 666_666_666.67 ns.
        assert_eq!(DataRate::bps(3).tx_time_bits(2), Time::nanos(666_666_667));
    }

    #[test]
    fn test_zero_rate_never_finishes() {
        assert_eq!(DataRate::bps(0).tx_time(1), Time::MAX);
    }

    #[test]
    fn test_parse() {
        assert_eq!("5Mbps".parse::<DataRate>().unwrap(), DataRate::mbps(5));
        assert_eq!("100kbps".parse::<DataRate>().unwrap(), DataRate::kbps(100));
        assert_eq!("1Gbps".parse::<DataRate>().unwrap(), DataRate::gbps(1));
        assert_eq!("500bps".parse::<DataRate>().unwrap(), DataRate::bps(500));
        assert_eq!("10KB/s".parse::<DataRate>().unwrap(), DataRate::kbps(80));
        assert_eq!("1.5Mbps".parse::<DataRate>().unwrap(), DataRate::kbps(1_500));
        assert_eq!("2048".parse::<DataRate>().unwrap(), DataRate::bps(2_048));
    }

    #[test]
    fn test_parse_errors() {
        assert!("5Mbit".parse::<DataRate>().is_err());
        assert!("fast".parse::<DataRate>().is_err());
        assert!("-5Mbps".parse::<DataRate>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataRate::mbps(5).to_string(), "5Mbps");
        assert_eq!(DataRate::kbps(1_500).to_string(), "1500kbps");
        assert_eq!(DataRate::bps(32_768).to_string(), "32768bps");
    }
}
