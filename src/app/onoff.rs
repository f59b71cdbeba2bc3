//! Constant-bit-rate source that alternates between on and off periods.
//!
//! While on, the app sends `packet_size`-byte packets spaced so the
//! offered load equals `data_rate`. Bits accrued during a partial interval
//! before an off period carry over, so the next on period sends its first
//! packet early by that amount. An off time of zero means always on.

use std::any::Any;

use tracing::{debug, trace};

use crate::event::EventHandle;
use crate::net::Packet;
use crate::rate::DataRate;
use crate::time::Time;

use super::{AppContext, Application};

const SEND_TIMER: u64 = 0;
const OFF_TIMER: u64 = 1;
const ON_TIMER: u64 = 2;

#[derive(Debug, Clone)]
pub struct OnOffApplication {
    data_rate: DataRate,
    packet_size: u32,
    on_time: Time,
    off_time: Time,
    max_bytes: Option<u64>,

    total_bytes: u64,
    sent: u64,
    refused: u64,
    /// Bits already "paid for" towards the next packet.
    residual_bits: u64,
    last_start: Time,
    next_send: Option<EventHandle>,
    toggle: Option<EventHandle>,
}

impl OnOffApplication {
    /// A source that is on for `on_time`, then off for `off_time`, and so
    /// on.
    pub fn new(data_rate: DataRate, packet_size: u32, on_time: Time, off_time: Time) -> Self {
        OnOffApplication {
            data_rate,
            packet_size,
            on_time,
            off_time,
            max_bytes: None,
            total_bytes: 0,
            sent: 0,
            refused: 0,
            residual_bits: 0,
            last_start: Time::ZERO,
            next_send: None,
            toggle: None,
        }
    }

    /// Always on.
    pub fn constant(data_rate: DataRate, packet_size: u32) -> Self {
        OnOffApplication::new(data_rate, packet_size, Time::ZERO, Time::ZERO)
    }

    /// Stop sending once this many bytes have been handed to the device.
    pub fn max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = Some(limit);
        self
    }

    /// Packets handed to the device, including refused ones.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn refused(&self) -> u64 {
        self.refused
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn always_on(&self) -> bool {
        self.off_time == Time::ZERO
    }

    fn exhausted(&self) -> bool {
        self.max_bytes.is_some_and(|limit| self.total_bytes >= limit)
    }

    fn start_on(&mut self, ctx: &mut AppContext<'_>) {
        self.last_start = ctx.now();
        if !self.always_on() {
            self.toggle = Some(ctx.schedule_timer(self.on_time, OFF_TIMER));
        }
        self.schedule_next_send(ctx);
    }

    fn schedule_next_send(&mut self, ctx: &mut AppContext<'_>) {
        if self.exhausted() {
            debug!(node = %ctx.node(), bytes = self.total_bytes, "on/off source done");
            // Nothing left to send, so stop cycling as well.
            if let Some(handle) = self.toggle.take() {
                ctx.cancel(&handle);
            }
            return;
        }
        let bits = (u64::from(self.packet_size) * 8).saturating_sub(self.residual_bits);
        let delay = self.data_rate.tx_time_bits(bits);
        self.next_send = Some(ctx.schedule_timer(delay, SEND_TIMER));
    }

    fn send_packet(&mut self, ctx: &mut AppContext<'_>) {
        self.next_send = None;
        self.sent += 1;
        self.total_bytes += u64::from(self.packet_size);
        self.residual_bits = 0;
        self.last_start = ctx.now();
        if let Err(reason) = ctx.send(Packet::new(self.packet_size)) {
            self.refused += 1;
            debug!(node = %ctx.node(), %reason, "on/off packet refused");
        }
        self.schedule_next_send(ctx);
    }

    fn go_off(&mut self, ctx: &mut AppContext<'_>) {
        self.toggle = None;
        if let Some(handle) = self.next_send.take() {
            ctx.cancel(&handle);
            let elapsed = (ctx.now() - self.last_start).as_nanos().max(0) as u128;
            let accrued = u128::from(self.data_rate.bits_per_sec()) * elapsed / 1_000_000_000;
            self.residual_bits += u64::try_from(accrued).unwrap_or(u64::MAX);
        }
        trace!(node = %ctx.node(), residual_bits = self.residual_bits, "on/off source off");
        self.toggle = Some(ctx.schedule_timer(self.off_time, ON_TIMER));
    }

    fn cancel_timers(&mut self, ctx: &mut AppContext<'_>) {
        for handle in [self.next_send.take(), self.toggle.take()].into_iter().flatten() {
            ctx.cancel(&handle);
        }
    }
}

impl Application for OnOffApplication {
    fn start(&mut self, ctx: &mut AppContext<'_>) {
        self.start_on(ctx);
    }

    fn stop(&mut self, ctx: &mut AppContext<'_>) {
        self.cancel_timers(ctx);
    }

    fn timer(&mut self, ctx: &mut AppContext<'_>, token: u64) {
        match token {
            SEND_TIMER => self.send_packet(ctx),
            OFF_TIMER => self.go_off(ctx),
            ON_TIMER => {
                self.toggle = None;
                self.start_on(ctx);
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
