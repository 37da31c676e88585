// CLASSIFICATION: COMMUNITY
// Filename: relay.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Kernel-side relay from the ISR queue to the application queue. This
//! stands in for a driver that drains an interrupt-fed queue.

use std::sync::Arc;

use log::{debug, error};
use thiserror::Error;

use super::state::SharedState;
use super::MSG_SIZE;
use crate::platform::{KThread, KThreadError, MqError, MqHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("short message: {got} of {expected} bytes")]
    ShortMessage { got: usize, expected: usize },
    #[error(transparent)]
    Queue(#[from] MqError),
}

impl RelayError {
    /// Exit code reported by the relay kthread.
    pub fn code(&self) -> i32 {
        match self {
            Self::ShortMessage { .. } => -90,
            Self::Queue(e) => e.errno(),
        }
    }
}

/// How a relay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Messages left unprocessed; 0 on full success.
    pub remaining: u32,
    pub result: Result<(), RelayError>,
}

impl RelayOutcome {
    pub fn code(&self) -> i32 {
        self.result.as_ref().err().map_or(0, RelayError::code)
    }
}

/// Forward up to `count` messages from `isrq` to `appq`, preserving
/// payload and priority.
pub fn relay(isrq: &MqHandle, appq: &MqHandle, count: u32) -> RelayOutcome {
    let mut buf = [0u8; MSG_SIZE];
    let mut remaining = count;
    let mut result = Ok(());

    while remaining > 0 {
        let (len, prio) = match isrq.receive(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                result = Err(e.into());
                break;
            }
        };
        if len != MSG_SIZE {
            result = Err(RelayError::ShortMessage {
                got: len,
                expected: MSG_SIZE,
            });
            break;
        }
        if let Err(e) = appq.send(&buf, prio) {
            result = Err(e.into());
            break;
        }
        remaining -= 1;
    }

    RelayOutcome { remaining, result }
}

/// Start the relay as a kernel thread owning its own queue descriptors.
///
/// The thread marks completion in `state` on every exit path so the
/// harness can tell whether it must be deleted.
pub fn spawn(
    name: &str,
    isrq: MqHandle,
    appq: MqHandle,
    count: u32,
    state: Arc<SharedState>,
    priority: u8,
    stack_size: usize,
) -> Result<KThread, KThreadError> {
    let task = name.to_string();
    KThread::spawn(name, priority, stack_size, move || {
        println!("{task} started, count={count}");
        let outcome = relay(&isrq, &appq, count);
        let code = outcome.code();
        match outcome.result {
            Ok(()) => debug!("{task} forwarded {count} messages"),
            Err(e) => error!("{task} aborted: {e}"),
        }
        println!("{task} exit {code}, remaining={}", outcome.remaining);
        isrq.close();
        appq.close();
        state.mark_relay_done(outcome.remaining);
        code
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mqueue::{self, MqAttr, OpenFlags};

    fn pair(prefix: &str, len: usize) -> (MqHandle, MqHandle) {
        let flags = OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::EXCL;
        let attr = Some(MqAttr::new(len, MSG_SIZE));
        (
            mqueue::open(&format!("{prefix}-isr"), flags, attr).unwrap(),
            mqueue::open(&format!("{prefix}-app"), flags, attr).unwrap(),
        )
    }

    fn unlink(prefix: &str) {
        mqueue::unlink(&format!("{prefix}-isr")).unwrap();
        mqueue::unlink(&format!("{prefix}-app")).unwrap();
    }

    #[test]
    fn forwards_payload_and_priority() {
        let (isrq, appq) = pair("relay-fwd", 4);
        isrq.send(&7u32.to_le_bytes(), 3).unwrap();
        isrq.send(&8u32.to_le_bytes(), 3).unwrap();
        let outcome = relay(&isrq, &appq, 2);
        assert_eq!(outcome, RelayOutcome { remaining: 0, result: Ok(()) });

        let mut buf = [0u8; MSG_SIZE];
        assert_eq!(appq.try_receive(&mut buf).unwrap(), (MSG_SIZE, 3));
        assert_eq!(u32::from_le_bytes(buf), 7);
        appq.try_receive(&mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 8);
        unlink("relay-fwd");
    }

    #[test]
    fn zero_count_returns_immediately() {
        let (isrq, appq) = pair("relay-zero", 1);
        assert_eq!(relay(&isrq, &appq, 0).remaining, 0);
        unlink("relay-zero");
    }

    #[test]
    fn short_message_stops_the_loop() {
        let (isrq, appq) = pair("relay-short", 4);
        isrq.send(&1u32.to_le_bytes(), 0).unwrap();
        isrq.send(&[0xaa, 0xbb], 0).unwrap();
        let outcome = relay(&isrq, &appq, 5);
        assert_eq!(outcome.remaining, 4);
        assert_eq!(
            outcome.result,
            Err(RelayError::ShortMessage { got: 2, expected: MSG_SIZE })
        );
        assert_eq!(outcome.code(), -90);
        assert_eq!(appq.len().unwrap(), 1);
        unlink("relay-short");
    }

    #[test]
    fn spawned_relay_marks_completion() {
        let (isrq, appq) = pair("relay-kt", 2);
        let state = Arc::new(SharedState::new());
        let kt = spawn("relay-kt", isrq.dup(), appq.dup(), 1, state.clone(), 253, 64 * 1024).unwrap();
        isrq.send(&5u32.to_le_bytes(), 0).unwrap();
        assert_eq!(kt.join().unwrap(), 0);
        assert!(state.relay_done());
        assert_eq!(state.relay_remaining(), 0);
        let mut buf = [0u8; MSG_SIZE];
        assert_eq!(appq.try_receive(&mut buf).unwrap().0, MSG_SIZE);
        unlink("relay-kt");
    }
}
