// CLASSIFICATION: COMMUNITY
// Filename: trigger.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Thread asserting the test interrupt.
//!
//! The throttle polls the in-flight count, yielding for `YIELD_SPINS`
//! rounds and then backing off with short sleeps.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::state::SharedState;
use crate::platform::irq::{self, Irq};

const YIELD_SPINS: u32 = 1_000;
const THROTTLE_BACKOFF: Duration = Duration::from_micros(200);

pub struct TriggerDriver {
    state: Arc<SharedState>,
    irq: Irq,
    count: u32,
    window: Option<u32>,
}

impl TriggerDriver {
    /// A driver issuing `count` assertions, keeping at most
    /// `queue_len - 1` of them ahead of the consumer.
    pub fn new(state: Arc<SharedState>, irq: Irq, count: u32, queue_len: usize) -> Self {
        let window = u32::try_from(queue_len.saturating_sub(1))
            .unwrap_or(u32::MAX)
            .max(1);
        Self {
            state,
            irq,
            count,
            window: Some(window),
        }
    }

    /// Drop the throttle and assert back to back.
    pub fn unthrottled(mut self) -> Self {
        self.window = None;
        self
    }

    pub fn window(&self) -> Option<u32> {
        self.window
    }

    /// Start the driver on its own thread.
    pub fn spawn(self, priority: u8, stack_size: usize) -> std::io::Result<JoinHandle<u32>> {
        debug!("trigger prio={priority} stack={stack_size}");
        thread::Builder::new()
            .name("trigger".into())
            .stack_size(stack_size)
            .spawn(move || self.run())
    }

    /// Wait for the start signal, then issue the assertions. Returns how
    /// many were issued.
    pub fn run(&self) -> u32 {
        if !self.state.wait_ready() {
            self.state.mark_trigger_done();
            return 0;
        }
        println!("trigger_thread started, count={}", self.count);

        let mut issued = 0;
        while issued < self.count && !self.state.aborted() {
            if let Err(e) = irq::raise(self.irq) {
                warn!("trigger stopped: {e}");
                break;
            }
            self.state.record_ipi_set();
            issued += 1;

            if !self.throttle() {
                break;
            }
        }

        self.state.mark_trigger_done();
        info!("trigger issued {issued} of {}", self.count);
        issued
    }

    /// Wait until fewer than `window` assertions are outstanding. Returns
    /// false if the harness aborted meanwhile.
    fn throttle(&self) -> bool {
        let Some(window) = self.window else {
            return true;
        };
        let mut spins = 0;
        while self.state.in_flight() >= window {
            if self.state.aborted() {
                return false;
            }
            if spins < YIELD_SPINS {
                thread::yield_now();
                spins += 1;
            } else {
                thread::sleep(THROTTLE_BACKOFF);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_clamped_for_single_slot_queue() {
        let state = Arc::new(SharedState::new());
        assert_eq!(TriggerDriver::new(state.clone(), Irq(4), 1, 7).window(), Some(6));
        assert_eq!(TriggerDriver::new(state.clone(), Irq(4), 1, 1).window(), Some(1));
        assert_eq!(TriggerDriver::new(state, Irq(4), 1, 7).unthrottled().window(), None);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let state = Arc::new(SharedState::new());
        let driver = TriggerDriver::new(state, Irq(4), 1, 7);
        assert!(driver.spawn(10, 1 << 50).is_err());
    }

    #[test]
    fn aborted_before_start_issues_nothing() {
        let state = Arc::new(SharedState::new());
        let driver = TriggerDriver::new(state.clone(), Irq(4), 10, 7);
        state.abort();
        assert_eq!(driver.run(), 0);
        assert!(state.trigger_done());
        assert_eq!(state.ipi_sets(), 0);
    }

    #[test]
    fn throttle_holds_until_consumer_catches_up() {
        // Line 13 stays masked; only the counters matter here.
        let state = Arc::new(SharedState::new());
        let handle = TriggerDriver::new(state.clone(), Irq(13), 5, 3)
            .spawn(10, 64 * 1024)
            .unwrap();
        state.signal_ready();
        while state.ipi_sets() < 2 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(state.ipi_sets(), 2);

        for _ in 0..5 {
            state.record_rcvd();
        }
        assert_eq!(handle.join().unwrap(), 5);
        assert!(state.max_in_flight() <= 2);
    }

    #[test]
    fn abort_releases_throttled_trigger() {
        let state = Arc::new(SharedState::new());
        let handle = TriggerDriver::new(state.clone(), Irq(14), 100, 2)
            .spawn(10, 64 * 1024)
            .unwrap();
        state.signal_ready();
        while state.ipi_sets() < 1 {
            thread::yield_now();
        }
        state.abort();
        assert_eq!(handle.join().unwrap(), 1);
        assert!(state.trigger_done());
    }
}
