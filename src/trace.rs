/// Packet tracing.
///
/// Records enqueue, dequeue, drop and receive points for every packet
/// into an append-only log. The log can be written in an ASCII line
/// format (one event per line, `+ - d r` opcodes) and reduced to a
/// deterministic digest so two runs can be compared cheaply.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use crate::net::{DeviceId, DropReason, NodeId};
use crate::simulation::Simulator;
use crate::time::Time;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── Entries ───────────────────────────────────────────────────────────

/// Where in a device's pipeline a trace point was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Accepted into the transmit queue.
    Enqueue,
    /// Finished serialising and handed to the channel.
    Dequeue,
    Drop(DropReason),
    /// Delivered to the receive callback.
    Receive,
}

impl TraceKind {
    /// Single-character opcode used in the ASCII format.
    pub fn opcode(&self) -> char {
        match self {
            TraceKind::Enqueue => '+',
            TraceKind::Dequeue => '-',
            TraceKind::Drop(_) => 'd',
            TraceKind::Receive => 'r',
        }
    }

    fn tag(&self) -> u64 {
        match self {
            TraceKind::Enqueue => 1,
            TraceKind::Dequeue => 2,
            TraceKind::Drop(DropReason::QueueFull) => 3,
            TraceKind::Drop(DropReason::ExceedsMtu { size, mtu }) => {
                hash_combine(4, hash_combine(u64::from(*size), u64::from(*mtu)))
            }
            TraceKind::Drop(DropReason::ReceiveError) => 5,
            TraceKind::Drop(DropReason::NoReceiver) => 6,
            TraceKind::Receive => 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub time: Time,
    pub node: NodeId,
    pub device: DeviceId,
    /// Index of `device` on `node`.
    pub device_index: usize,
    pub kind: TraceKind,
    pub packet_uid: Option<u64>,
    pub size: u32,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.9} /NodeList/{}/DeviceList/{}",
            self.kind.opcode(),
            self.time.as_secs_f64(),
            self.node.raw(),
            self.device_index
        )?;
        match self.packet_uid {
            Some(uid) => write!(f, " uid={uid}")?,
            None => write!(f, " uid=-")?,
        }
        write!(f, " size={}", self.size)?;
        if let TraceKind::Drop(reason) = self.kind {
            write!(f, " reason={reason}")?;
        }
        Ok(())
    }
}

// ── Trace log ─────────────────────────────────────────────────────────

/// Append-only log of packet trace points.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    entries: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn new() -> Self {
        TraceLog::default()
    }

    pub fn record(&mut self, entry: TraceEvent) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind, in recording order.
    pub fn filter<'a>(
        &'a self,
        pred: impl Fn(&TraceKind) -> bool + 'a,
    ) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.entries.iter().filter(move |e| pred(&e.kind))
    }

    /// Deterministic hash of every entry, in order.
    pub fn digest(&self) -> u64 {
        let mut h: u64 = 0;
        for e in &self.entries {
            h = hash_combine(h, e.time.as_nanos() as u64);
            h = hash_combine(h, u64::from(e.device.raw()));
            h = hash_combine(h, e.kind.tag());
            h = hash_combine(h, e.packet_uid.unwrap_or(0));
            h = hash_combine(h, u64::from(e.size));
        }
        h
    }

    /// Write every entry as one ASCII line.
    pub fn write_ascii<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for e in &self.entries {
            writeln!(w, "{e}")?;
        }
        Ok(())
    }

    pub fn write_ascii_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let f = std::fs::File::create(path)?;
        let mut w = io::BufWriter::new(f);
        self.write_ascii(&mut w)?;
        w.flush()
    }
}

/// Observer called for every dropped packet.
pub type DropHook = Box<dyn FnMut(&TraceEvent)>;

// ── Simulator hooks ───────────────────────────────────────────────────

impl Simulator {
    /// Start recording trace entries. Entries before this call are lost.
    pub fn enable_tracing(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(TraceLog::new());
        }
    }

    pub fn trace_log(&self) -> Option<&TraceLog> {
        self.trace.as_ref()
    }

    /// Stop recording and hand back what was collected.
    pub fn take_trace_log(&mut self) -> Option<TraceLog> {
        self.trace.take()
    }

    /// Register an observer for dropped packets, replacing any previous one.
    /// Fires whether or not tracing is enabled.
    pub fn on_drop<F>(&mut self, hook: F)
    where
        F: FnMut(&TraceEvent) + 'static,
    {
        self.drop_hook = Some(Box::new(hook));
    }

    pub(crate) fn trace_packet(
        &mut self,
        device: DeviceId,
        kind: TraceKind,
        packet_uid: Option<u64>,
        size: u32,
    ) {
        let is_drop = matches!(kind, TraceKind::Drop(_));
        if self.trace.is_none() && !(is_drop && self.drop_hook.is_some()) {
            return;
        }
        let Some(dev) = self.network.devices.get(device.index()) else {
            return;
        };
        let entry = TraceEvent {
            time: self.now(),
            node: dev.node(),
            device,
            device_index: dev.index_on_node(),
            kind,
            packet_uid,
            size,
        };
        if is_drop {
            if let Some(hook) = self.drop_hook.as_mut() {
                hook(&entry);
            }
        }
        if let Some(log) = self.trace.as_mut() {
            log.record(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: TraceKind, uid: u64) -> TraceEvent {
        TraceEvent {
            time: Time::millis(2),
            node: NodeId::new(1),
            device: DeviceId::new(3),
            device_index: 0,
            kind,
            packet_uid: Some(uid),
            size: 1024,
        }
    }

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash_combine(42, 99), hash_combine(42, 99));
        assert_ne!(hash_combine(42, 99), hash_combine(42, 100));
    }

    #[test]
    fn test_ascii_line() {
        let e = entry(TraceKind::Receive, 1);
        assert_eq!(e.to_string(), "r 0.002000000 /NodeList/1/DeviceList/0 uid=1 size=1024");
        let d = entry(TraceKind::Drop(DropReason::QueueFull), 4);
        assert!(d.to_string().starts_with("d "));
        assert!(d.to_string().ends_with("reason=QueueFull"));
    }

    #[test]
    fn test_write_ascii_one_line_per_entry() {
        let mut log = TraceLog::new();
        log.record(entry(TraceKind::Enqueue, 1));
        log.record(entry(TraceKind::Dequeue, 1));
        let mut buf = Vec::new();
        log.write_ascii(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let ops: Vec<char> = text.lines().map(|l| l.chars().next().unwrap()).collect();
        assert_eq!(ops, vec!['+', '-']);
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let mut a = TraceLog::new();
        a.record(entry(TraceKind::Enqueue, 1));
        a.record(entry(TraceKind::Enqueue, 2));
        let mut b = TraceLog::new();
        b.record(entry(TraceKind::Enqueue, 2));
        b.record(entry(TraceKind::Enqueue, 1));
        assert_eq!(a.digest(), a.clone().digest());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_filter_by_kind() {
        let mut log = TraceLog::new();
        log.record(entry(TraceKind::Enqueue, 1));
        log.record(entry(TraceKind::Drop(DropReason::NoReceiver), 2));
        let drops: Vec<_> = log.filter(|k| matches!(k, TraceKind::Drop(_))).collect();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].packet_uid, Some(2));
    }
}
