// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Single-primitive probes: heap exhaustion and stack depth.

pub mod heap;
pub mod stack;
