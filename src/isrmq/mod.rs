// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! ISR message-queue test.
//!
//! A trigger thread asserts a software interrupt; the ISR enqueues a
//! sequence number into the ISR queue; a relay kthread forwards each
//! message to the application queue, where the harness consumes and counts
//! them. The run passes when every interrupt produced exactly one message
//! and every message arrived.

pub mod harness;
pub mod producer;
pub mod relay;
pub mod report;
pub mod state;
pub mod trigger;

pub use harness::{IsrmqTest, Stage};
pub use report::{TestReport, Verdict};
pub use state::{CounterSnapshot, SharedState};

/// Size of one queued message: a little-endian `u32` sequence number.
pub const MSG_SIZE: usize = core::mem::size_of::<u32>();

/// Run the test with `config` and return the report.
pub fn isrmq_test(config: crate::config::HarnessConfig, attempts: u32) -> TestReport {
    IsrmqTest::new(config).run(attempts)
}
