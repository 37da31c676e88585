// CLASSIFICATION: COMMUNITY
// Filename: state.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! State shared by the harness, the relay, the trigger and the ISR.
//!
//! Every counter has exactly one writer:
//!
//! | counter     | writer    |
//! |-------------|-----------|
//! | `ipi_sets`  | trigger   |
//! | `ipi_rcvd`  | ISR       |
//! | `msg_sent`  | ISR       |
//! | `msg_rcvd`  | harness   |
//!
//! Readers may see stale values, which the throttle tolerates.

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-shot start signal.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn open(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = true;
            self.cv.notify_all();
        }
    }

    fn wait(&self) {
        let Ok(open) = self.open.lock() else {
            return;
        };
        drop(self.cv.wait_while(open, |open| !*open));
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let Ok(open) = self.open.lock() else {
            return false;
        };
        self.cv
            .wait_timeout_while(open, timeout, |open| !*open)
            .map(|(open, _)| *open)
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct SharedState {
    ipi_sets: AtomicU32,
    ipi_rcvd: AtomicU32,
    msg_sent: AtomicU32,
    msg_rcvd: AtomicU32,
    max_in_flight: AtomicU32,
    relay_remaining: AtomicU32,
    relay_done: AtomicBool,
    trigger_done: AtomicBool,
    abort: AtomicBool,
    ready: Gate,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ipi_set(&self) {
        let sets = self.ipi_sets.fetch_add(1, Ordering::AcqRel) + 1;
        let in_flight = sets.saturating_sub(self.msg_rcvd.load(Ordering::Acquire));
        self.max_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    pub fn record_ipi_rcvd(&self) {
        self.ipi_rcvd.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_sent(&self) {
        self.msg_sent.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_rcvd(&self) {
        self.msg_rcvd.fetch_add(1, Ordering::AcqRel);
    }

    /// Sequence number the next successful ISR enqueue will carry.
    pub fn next_sequence(&self) -> u32 {
        self.msg_sent.load(Ordering::Acquire)
    }

    pub fn ipi_sets(&self) -> u32 {
        self.ipi_sets.load(Ordering::Acquire)
    }

    pub fn msg_sent(&self) -> u32 {
        self.msg_sent.load(Ordering::Acquire)
    }

    pub fn msg_rcvd(&self) -> u32 {
        self.msg_rcvd.load(Ordering::Acquire)
    }

    /// Assertions issued but not yet matched by a received message.
    pub fn in_flight(&self) -> u32 {
        self.ipi_sets().saturating_sub(self.msg_rcvd())
    }

    /// Largest `in_flight` value observed right after an assertion.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::Relaxed)
    }

    pub fn mark_relay_done(&self, remaining: u32) {
        self.relay_remaining.store(remaining, Ordering::Release);
        self.relay_done.store(true, Ordering::Release);
    }

    pub fn relay_done(&self) -> bool {
        self.relay_done.load(Ordering::Acquire)
    }

    pub fn relay_remaining(&self) -> u32 {
        self.relay_remaining.load(Ordering::Acquire)
    }

    pub fn mark_trigger_done(&self) {
        self.trigger_done.store(true, Ordering::Release);
    }

    pub fn trigger_done(&self) -> bool {
        self.trigger_done.load(Ordering::Acquire)
    }

    /// Nothing further can reach the application queue: either the relay
    /// has left its loop, or the trigger is finished and everything the
    /// ISR managed to enqueue has been consumed.
    pub fn pipeline_drained(&self) -> bool {
        self.relay_done() || (self.trigger_done() && self.msg_rcvd() >= self.msg_sent())
    }

    /// Let the trigger start asserting interrupts.
    pub fn signal_ready(&self) {
        self.ready.open();
    }

    /// Block until [`signal_ready`](Self::signal_ready) or [`abort`](Self::abort).
    pub fn wait_ready(&self) -> bool {
        self.ready.wait();
        !self.aborted()
    }

    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        self.ready.wait_timeout(timeout) && !self.aborted()
    }

    /// Tell the trigger to stop. Also releases a trigger still waiting for
    /// the start signal.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        self.ready.open();
    }

    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ipi_sets: self.ipi_sets(),
            ipi_rcvd: self.ipi_rcvd.load(Ordering::Acquire),
            msg_sent: self.msg_sent(),
            msg_rcvd: self.msg_rcvd(),
        }
    }
}

/// Point-in-time copy of the four counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub ipi_sets: u32,
    pub ipi_rcvd: u32,
    pub msg_sent: u32,
    pub msg_rcvd: u32,
}

impl CounterSnapshot {
    /// Every produced message was received and every interrupt produced one.
    pub fn consistent(&self) -> bool {
        self.msg_sent == self.msg_rcvd && self.ipi_rcvd == self.msg_sent
    }

    /// Interrupts whose message was dropped on a full ISR queue.
    pub fn dropped(&self) -> u32 {
        self.ipi_rcvd.saturating_sub(self.msg_sent)
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ipi sets={}, rcvd={}; msg sent={}, rcvd={}",
            self.ipi_sets, self.ipi_rcvd, self.msg_sent, self.msg_rcvd
        )
    }
}
