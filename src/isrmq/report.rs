// CLASSIFICATION: COMMUNITY
// Filename: report.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use core::fmt;

use super::harness::Stage;
use super::state::CounterSnapshot;
use crate::error::ProbeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of one harness run.
#[derive(Debug)]
pub struct TestReport {
    pub attempts: u32,
    pub counters: CounterSnapshot,
    pub verdict: Verdict,
    /// First failure, if any. Setup and relay failures take precedence
    /// over a counter mismatch.
    pub error: Option<ProbeError>,
    /// Last stage entered before teardown.
    pub stage_reached: Stage,
    /// Exit code of the relay kthread, if it exited on its own.
    pub relay_exit: Option<i32>,
    /// The relay had to be deleted during teardown.
    pub relay_deleted: bool,
    pub max_in_flight: u32,
    pub out_of_order: u32,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// Process exit code: 0 on success, otherwise the code of the failure.
    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map_or(0, ProbeError::exit_code)
    }
}
