// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! OS primitives the probes are written against: the interrupt vector
//! table, named bounded message queues and kernel worker threads.

pub mod irq;
pub mod kthread;
pub mod mqueue;

pub use irq::{Irq, IrqError, IrqHandler, IrqRegistration, IrqStatus, IRQ_SOFT};
pub use kthread::{KThread, KThreadError, TaskInfo, TaskState, PRIO_SYSTEM};
pub use mqueue::{MqAttr, MqError, MqHandle, OpenFlags};
