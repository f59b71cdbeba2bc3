//! Packets moving through devices, queues and channels.

use std::fmt;

use bytes::Bytes;

/// An opaque frame with a byte size.
///
/// `size` is what the link model charges for; `payload` carries optional
/// application bytes and may be shorter than `size` (the rest is treated
/// as padding). The simulator stamps a unique `uid` the first time the
/// packet is handed to a device.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    uid: Option<u64>,
    size: u32,
    payload: Bytes,
}

impl Packet {
    /// A packet of `size` bytes with no concrete contents.
    pub fn new(size: u32) -> Self {
        Packet {
            uid: None,
            size,
            payload: Bytes::new(),
        }
    }

    /// A packet whose size is the payload length.
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Packet {
            uid: None,
            size,
            payload,
        }
    }

    /// A `size`-byte packet carrying `payload` in its first bytes. The
    /// size never drops below the payload length.
    pub fn with_payload(size: u32, payload: impl Into<Bytes>) -> Self {
        let mut packet = Packet::from_payload(payload);
        packet.size = packet.size.max(size);
        packet
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn size_bits(&self) -> u64 {
        u64::from(self.size) * 8
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn uid(&self) -> Option<u64> {
        self.uid
    }

    pub(crate) fn stamp(&mut self, uid: u64) {
        if self.uid.is_none() {
            self.uid = Some(uid);
        }
    }

    /// A fresh packet with the same size and payload, as an echo would
    /// send back.
    pub fn reply(&self) -> Self {
        Packet {
            uid: None,
            size: self.size,
            payload: self.payload.clone(),
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid {
            Some(uid) => write!(f, "Packet(#{}, {} bytes)", uid, self.size),
            None => write!(f, "Packet({} bytes)", self.size),
        }
    }
}
