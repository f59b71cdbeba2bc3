//! Topology-level tests: devices, channels and the scheduler together.

use std::cell::RefCell;
use std::rc::Rc;

use tracing_test::traced_test;

use super::*;
use crate::helper::PointToPointHelper;
use crate::rate::DataRate;
use crate::time::Time;
use crate::trace::TraceKind;

type Arrivals = Rc<RefCell<Vec<(Time, Option<u64>, u32)>>>;

fn link(
    sim: &mut Simulator,
    rate: DataRate,
    delay: Time,
    queue: QueueCapacity,
) -> (DeviceId, DeviceId) {
    let (a, b) = (sim.create_node(), sim.create_node());
    PointToPointHelper::new()
        .data_rate(rate)
        .delay(delay)
        .queue(queue)
        .install(sim, a, b)
        .unwrap()
}

fn record_arrivals(sim: &mut Simulator, device: DeviceId) -> Arrivals {
    let arrivals: Arrivals = Rc::new(RefCell::new(Vec::new()));
    let log = arrivals.clone();
    sim.set_receive_callback(device, move |sim, _dev, packet| {
        log.borrow_mut().push((sim.now(), packet.uid(), packet.size()));
    })
    .unwrap();
    arrivals
}

// ── Timing ────────────────────────────────────────────────────────────

#[test]
fn test_single_packet_arrival_time() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::default());
    let arrivals = record_arrivals(&mut sim, b);

    sim.send(a, Packet::new(1024)).unwrap();
    sim.run();

    // 8192 bits / 5 Mbps + 2 ms
    assert_eq!(*arrivals.borrow(), vec![(Time::nanos(3_638_400), Some(1), 1024)]);
}

#[test]
fn test_back_to_back_serialization() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    let arrivals = record_arrivals(&mut sim, b);

    sim.send(a, Packet::new(500)).unwrap();
    sim.send(a, Packet::new(1000)).unwrap();
    assert!(sim.device(a).unwrap().is_transmitting());
    // Only the head packet has a completion event outstanding.
    assert_eq!(sim.pending_events(), 1);
    sim.run();

    let times: Vec<Time> = arrivals.borrow().iter().map(|(t, _, _)| *t).collect();
    // S1/R = 4ms, S1/R + S2/R = 12ms
    assert_eq!(times, vec![Time::millis(4), Time::millis(12)]);
    assert!(!sim.device(a).unwrap().is_transmitting());
}

#[test]
fn test_idle_gap_restarts_serialization() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::millis(1), QueueCapacity::default());
    let arrivals = record_arrivals(&mut sim, b);

    sim.send(a, Packet::new(125)).unwrap();
    sim.schedule(Time::millis(10), move |sim| sim.send(a, Packet::new(125)).unwrap());
    sim.run();

    let times: Vec<Time> = arrivals.borrow().iter().map(|(t, _, _)| *t).collect();
    assert_eq!(times, vec![Time::millis(2), Time::millis(12)]);
}

#[test]
fn test_both_directions_are_independent() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::default());
    let at_a = record_arrivals(&mut sim, a);
    let at_b = record_arrivals(&mut sim, b);

    sim.send(a, Packet::new(1024)).unwrap();
    sim.send(b, Packet::new(1024)).unwrap();
    sim.run();

    assert_eq!(at_a.borrow()[0].0, Time::nanos(3_638_400));
    assert_eq!(at_b.borrow()[0].0, Time::nanos(3_638_400));
}

// ── Queueing ──────────────────────────────────────────────────────────

#[test]
fn test_queue_full_on_third_send() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::Packets(2));
    let arrivals = record_arrivals(&mut sim, b);

    assert_eq!(sim.send(a, Packet::new(100)), Ok(()));
    assert_eq!(sim.send(a, Packet::new(100)), Ok(()));
    assert_eq!(sim.send(a, Packet::new(100)), Err(DropReason::QueueFull));
    sim.run();

    assert_eq!(arrivals.borrow().len(), 2);
    let stats = sim.device(a).unwrap().stats();
    assert_eq!(stats.tx_packets, 2);
    assert_eq!(stats.drops.queue_full, 1);
    assert_eq!(sim.device(a).unwrap().queue().stats().dropped, 1);
}

#[test]
fn test_queue_full_count_matches_excess() {
    for (sent, capacity) in [(1u32, 3u32), (5, 3), (10, 1), (20, 7)] {
        let mut sim = Simulator::new();
        let queue = QueueCapacity::Packets(capacity);
        let (a, b) = link(&mut sim, DataRate::kbps(64), Time::ZERO, queue);
        let arrivals = record_arrivals(&mut sim, b);
        let full = (0..sent)
            .filter(|_| sim.send(a, Packet::new(64)) == Err(DropReason::QueueFull))
            .count() as u32;
        sim.run();
        assert_eq!(full, sent.saturating_sub(capacity));
        assert_eq!(arrivals.borrow().len() as u32, sent.min(capacity));
    }
}

#[test]
fn test_byte_capacity() {
    let mut sim = Simulator::new();
    let (a, _b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::Bytes(1500));
    assert!(sim.send(a, Packet::new(1000)).is_ok());
    assert!(sim.send(a, Packet::new(500)).is_ok());
    assert_eq!(sim.send(a, Packet::new(1)), Err(DropReason::QueueFull));
}

#[test]
fn test_queue_frees_space_after_transmission() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::Packets(1));
    let arrivals = record_arrivals(&mut sim, b);
    sim.send(a, Packet::new(125)).unwrap();
    // 1ms later the first packet is gone and the slot is free again.
    sim.schedule(Time::millis(1), move |sim| {
        assert_eq!(sim.send(a, Packet::new(125)), Ok(()));
    });
    sim.run();
    assert_eq!(arrivals.borrow().len(), 2);
}

#[test]
fn test_mtu_drop() {
    let mut sim = Simulator::new();
    let (a, _b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    assert_eq!(
        sim.send(a, Packet::new(1501)),
        Err(DropReason::ExceedsMtu { size: 1501, mtu: 1500 })
    );
    assert_eq!(sim.pending_events(), 0);
    // A dropped packet still counts as traffic for the config lock.
    assert!(sim.set_mtu(a, None).is_err());
    assert_eq!(sim.device(a).unwrap().stats().drops.exceeds_mtu, 1);
}

// ── Receive side ──────────────────────────────────────────────────────

#[traced_test]
#[test]
fn test_no_receiver_drop_is_logged() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::default());
    sim.send(a, Packet::new(64)).unwrap();
    sim.run();

    let stats = sim.device(b).unwrap().stats();
    assert_eq!(stats.rx_packets, 0);
    assert_eq!(stats.drops.no_receiver, 1);
    assert!(logs_contain("packet dropped"));
    assert!(logs_contain("NoReceiver"));
}

#[test]
fn test_error_model_drops_everything_at_rate_one() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::ZERO, QueueCapacity::default());
    let arrivals = record_arrivals(&mut sim, b);
    sim.set_error_model(b, Some(RateErrorModel::per_packet(1.0, 3))).unwrap();
    for _ in 0..5 {
        sim.send(a, Packet::new(64)).unwrap();
    }
    sim.run();
    assert!(arrivals.borrow().is_empty());
    assert_eq!(sim.device(b).unwrap().stats().drops.receive_error, 5);
}

#[test]
fn test_callback_may_replace_itself() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::ZERO, QueueCapacity::default());
    let hits = Rc::new(RefCell::new(Vec::new()));
    let h = hits.clone();
    sim.set_receive_callback(b, move |sim, dev, _| {
        h.borrow_mut().push("first");
        let h2 = h.clone();
        sim.set_receive_callback(dev, move |_, _, _| h2.borrow_mut().push("second"))
            .unwrap();
    })
    .unwrap();
    sim.send(a, Packet::new(64)).unwrap();
    sim.send(a, Packet::new(64)).unwrap();
    sim.run();
    assert_eq!(*hits.borrow(), vec!["first", "second"]);
}

#[test]
fn test_echo_from_callback() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::default());
    sim.set_receive_callback(b, |sim, dev, packet| {
        sim.send(dev, packet.reply()).unwrap();
    })
    .unwrap();
    let back = record_arrivals(&mut sim, a);
    sim.send(a, Packet::new(1024)).unwrap();
    sim.run();
    assert_eq!(back.borrow()[0].0, Time::nanos(7_276_800));
    // The reply is a new packet with its own uid.
    assert_eq!(back.borrow()[0].1, Some(2));
}

// ── Topology errors ───────────────────────────────────────────────────

#[test]
#[should_panic(expected = "no peer device attached")]
fn test_send_on_unattached_device_panics() {
    let mut sim = Simulator::new();
    let n = sim.create_node();
    let d = sim.add_device(n, DeviceConfig::default()).unwrap();
    let _ = sim.send(d, Packet::new(10));
}

#[test]
#[should_panic(expected = "no peer device attached")]
fn test_transmit_without_peer_panics() {
    let mut sim = Simulator::new();
    let n = sim.create_node();
    let d = sim.add_device(n, DeviceConfig::default()).unwrap();
    let ch = sim.create_channel(ChannelConfig::default());
    sim.attach(ch, d).unwrap();
    sim.send(d, Packet::new(10)).unwrap();
    sim.run();
}

#[test]
fn test_third_attach_is_rejected() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    let n = sim.create_node();
    let c = sim.add_device(n, DeviceConfig::default()).unwrap();
    let ch = sim.device(a).unwrap().channel().unwrap();
    assert_eq!(
        sim.attach(ch, c),
        Err(crate::error::SimError::ChannelFull { channel: ch, device: c })
    );
    assert_eq!(sim.channel(ch).unwrap().devices(), &[a, b]);
    assert_eq!(sim.device(c).unwrap().channel(), None);
}

#[test]
fn test_device_attaches_once() {
    let mut sim = Simulator::new();
    let (a, _) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    let existing = sim.device(a).unwrap().channel().unwrap();
    let other = sim.create_channel(ChannelConfig::shared(Time::ZERO));
    assert_eq!(
        sim.attach(other, a),
        Err(crate::error::SimError::DeviceAlreadyAttached { device: a, channel: other, existing })
    );
}

#[test]
fn test_config_locked_after_first_send() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    sim.set_data_rate(a, DataRate::mbps(2)).unwrap();
    sim.send(a, Packet::new(10)).unwrap();
    assert_eq!(
        sim.set_data_rate(a, DataRate::mbps(3)),
        Err(crate::error::SimError::ConfigLocked { device: a })
    );
    assert!(sim.set_queue_capacity(a, QueueCapacity::Packets(5)).is_err());
    // The peer has not sent anything yet.
    assert!(sim.set_data_rate(b, DataRate::mbps(3)).is_ok());
    assert!(sim.set_data_rate(b, DataRate::bps(0)).is_err());
}

#[test]
fn test_propagation_delay_change() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::default());
    let ch = sim.device(a).unwrap().channel().unwrap();
    sim.set_propagation_delay(ch, Time::millis(10)).unwrap();
    assert!(sim.set_propagation_delay(ch, Time::millis(-1)).is_err());
    let arrivals = record_arrivals(&mut sim, b);
    sim.send(a, Packet::new(1024)).unwrap();
    sim.run();
    assert_eq!(arrivals.borrow()[0].0, Time::nanos(11_638_400));
}

// ── Shared channel ────────────────────────────────────────────────────

#[test]
fn test_shared_channel_reaches_every_other_device() {
    let mut sim = Simulator::new();
    let nodes: Vec<NodeId> = (0..3).map(|_| sim.create_node()).collect();
    let devs = crate::helper::SharedBusHelper::new()
        .data_rate(DataRate::mbps(8))
        .delay(Time::micros(5))
        .install(&mut sim, &nodes)
        .unwrap();
    let at: Vec<Arrivals> = devs.iter().map(|d| record_arrivals(&mut sim, *d)).collect();

    sim.send(devs[1], Packet::new(1000)).unwrap();
    sim.run();

    assert!(at[1].borrow().is_empty());
    for i in [0, 2] {
        let got = at[i].borrow();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, Time::millis(1) + Time::micros(5));
        // Every copy keeps the original uid.
        assert_eq!(got[0].1, Some(1));
    }
}

// ── Addressing and tracing ────────────────────────────────────────────

#[test]
fn test_addresses_follow_device_order() {
    let mut sim = Simulator::new();
    let (a, b) = link(&mut sim, DataRate::mbps(1), Time::ZERO, QueueCapacity::default());
    let mut alloc =
        Ipv4AddressAllocator::new([10, 1, 1, 0].into(), [255, 255, 255, 0].into()).unwrap();
    let addrs = alloc.assign(&mut sim, &[a, b]).unwrap();
    assert_eq!(addrs, vec![Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2)]);
    assert_eq!(sim.device(b).unwrap().address(), Some(Ipv4Addr::new(10, 1, 1, 2)));
    assert_eq!(sim.device_by_address(Ipv4Addr::new(10, 1, 1, 1)), Some(a));
    assert_eq!(sim.device_by_address(Ipv4Addr::new(10, 1, 1, 9)), None);
}

#[test]
fn test_trace_records_packet_lifecycle() {
    let mut sim = Simulator::new();
    sim.enable_tracing();
    let (a, b) = link(&mut sim, DataRate::mbps(5), Time::millis(2), QueueCapacity::Packets(1));
    record_arrivals(&mut sim, b);
    sim.send(a, Packet::new(1024)).unwrap();
    sim.send(a, Packet::new(1024)).unwrap_err();
    sim.run();

    let log = sim.trace_log().unwrap();
    let kinds: Vec<TraceKind> = log.entries().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TraceKind::Enqueue,
            TraceKind::Drop(DropReason::QueueFull),
            TraceKind::Dequeue,
            TraceKind::Receive,
        ]
    );
    let mut ascii = Vec::new();
    log.write_ascii(&mut ascii).unwrap();
    let text = String::from_utf8(ascii).unwrap();
    assert!(text.lines().next().unwrap().starts_with("+ 0.000000000 /NodeList/0/DeviceList/0"));
    assert!(text.lines().last().unwrap().starts_with("r 0.003638400 /NodeList/1/DeviceList/0"));
}

#[test]
fn test_on_drop_hook_without_tracing() {
    let mut sim = Simulator::new();
    let (a, _b) = link(&mut sim, DataRate::mbps(5), Time::ZERO, QueueCapacity::Packets(1));
    let drops = Rc::new(RefCell::new(Vec::new()));
    let d = drops.clone();
    sim.on_drop(move |e| d.borrow_mut().push((e.device, e.kind)));
    sim.send(a, Packet::new(10)).unwrap();
    sim.send(a, Packet::new(10)).unwrap_err();
    assert_eq!(*drops.borrow(), vec![(a, TraceKind::Drop(DropReason::QueueFull))]);
    assert!(sim.trace_log().is_none());
}

#[test]
fn test_identical_runs_have_identical_digests() {
    fn run() -> u64 {
        let mut sim = Simulator::new();
        sim.enable_tracing();
        let (a, b) = link(&mut sim, DataRate::mbps(2), Time::millis(1), QueueCapacity::Packets(3));
        sim.set_error_model(b, Some(RateErrorModel::per_byte(0.001, 5))).unwrap();
        record_arrivals(&mut sim, b);
        for i in 0..20u32 {
            sim.schedule(Time::micros(i64::from(i) * 700), move |sim| {
                let _ = sim.send(a, Packet::new(200 + i));
            });
        }
        sim.run();
        sim.trace_log().unwrap().digest()
    }
    assert_eq!(run(), run());
}
