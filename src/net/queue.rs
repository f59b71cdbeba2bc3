//! Drop-tail transmit queue.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::time::split_unit;

use super::packet::Packet;

/// Queue limit, in packets or in bytes.
///
/// Parses from `"100p"` (packets) or `"64000B"` (bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QueueCapacity {
    Packets(u32),
    Bytes(u32),
}

impl Default for QueueCapacity {
    fn default() -> Self {
        QueueCapacity::Packets(100)
    }
}

impl fmt::Display for QueueCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueCapacity::Packets(n) => write!(f, "{}p", n),
            QueueCapacity::Bytes(n) => write!(f, "{}B", n),
        }
    }
}

impl FromStr for QueueCapacity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_unit(s)?;
        let n: u32 = value
            .parse()
            .map_err(|_| ParseError::InvalidNumber(s.to_string()))?;
        match unit {
            "p" | "" => Ok(QueueCapacity::Packets(n)),
            "B" => Ok(QueueCapacity::Bytes(n)),
            other => Err(ParseError::UnknownUnit {
                input: s.to_string(),
                unit: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for QueueCapacity {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<QueueCapacity> for String {
    fn from(c: QueueCapacity) -> String {
        c.to_string()
    }
}

/// Lifetime counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
}

/// FIFO that rejects arrivals once the capacity is reached.
///
/// The head packet is the one on the wire; it keeps occupying capacity
/// until the device dequeues it at transmission-complete time.
#[derive(Debug, Clone)]
pub struct DropTailQueue {
    capacity: QueueCapacity,
    packets: VecDeque<Packet>,
    bytes: u64,
    stats: QueueStats,
}

impl DropTailQueue {
    pub fn new(capacity: QueueCapacity) -> Self {
        DropTailQueue {
            capacity,
            packets: VecDeque::new(),
            bytes: 0,
            stats: QueueStats::default(),
        }
    }

    pub fn capacity(&self) -> QueueCapacity {
        self.capacity
    }

    pub(crate) fn set_capacity(&mut self, capacity: QueueCapacity) {
        self.capacity = capacity;
    }

    /// Whether a packet of `size` bytes would fit right now.
    pub fn has_room_for(&self, size: u32) -> bool {
        match self.capacity {
            QueueCapacity::Packets(max) => self.packets.len() < max as usize,
            QueueCapacity::Bytes(max) => self.bytes + u64::from(size) <= u64::from(max),
        }
    }

    /// Append `packet`, or hand it back if the queue is full.
    pub fn enqueue(&mut self, packet: Packet) -> Result<(), Packet> {
        if !self.has_room_for(packet.size()) {
            self.stats.dropped += 1;
            return Err(packet);
        }
        self.bytes += u64::from(packet.size());
        self.packets.push_back(packet);
        self.stats.enqueued += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.bytes -= u64::from(packet.size());
        self.stats.dequeued += 1;
        Some(packet)
    }

    pub fn peek(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}
