// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

//! Diagnostic probes for a small kernel: the ISR message-queue relay test
//! and the heap and stack exhaustion probes.

/// Harness configuration and process-wide defaults
pub mod config;

/// Probe errors and exit codes
pub mod error;

/// ISR to message queue relay test
pub mod isrmq;

/// Interrupt, message queue and kernel thread primitives
pub mod platform;

/// Heap and stack probes
pub mod probe;

/// Library wrappers for the binaries
pub mod binlib;

pub use error::ProbeError;
