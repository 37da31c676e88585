// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Top-level probe errors and their process exit codes.

use thiserror::Error;

use crate::config::ConfigError;
use crate::isrmq::CounterSnapshot;
use crate::platform::{Irq, IrqError, KThreadError, MqError};

pub const EXIT_MISMATCH: i32 = 1;
pub const EXIT_QUEUE_CREATE: i32 = 2;
pub const EXIT_RELAY_SPAWN: i32 = 3;
pub const EXIT_IRQ_ATTACH: i32 = 4;
pub const EXIT_TRIGGER_SPAWN: i32 = 5;
pub const EXIT_RELAY: i32 = 6;
pub const EXIT_STALLED: i32 = 7;
pub const EXIT_ALLOC: i32 = 8;
pub const EXIT_STACK: i32 = 9;
pub const EXIT_USAGE: i32 = 64;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create {name} mqueue: {source}")]
    QueueCreate {
        name: String,
        #[source]
        source: MqError,
    },
    #[error("failed to create relay kthread: {0}")]
    RelaySpawn(#[source] KThreadError),
    #[error("failed to attach ISR to {irq}: {source}")]
    IrqAttach {
        irq: Irq,
        #[source]
        source: IrqError,
    },
    #[error("failed to create trigger thread: {0}")]
    TriggerSpawn(#[source] std::io::Error),
    #[error("application queue receive failed: {0}")]
    Consume(#[source] MqError),
    #[error("relay exited with {code}, remaining={remaining}")]
    Relay { code: i32, remaining: u32 },
    #[error("relay pipeline stalled after {received} messages")]
    Stalled { received: u32 },
    #[error("counter mismatch: {0}")]
    Mismatch(CounterSnapshot),
    #[error("failed to allocate buffer {index} of {size} bytes")]
    Alloc { index: usize, size: usize },
    #[error("stack probe thread died before reaching depth {depth}")]
    StackProbe { depth: u64 },
    #[error("{0}")]
    Usage(String),
}

impl ProbeError {
    /// Distinct non-zero exit code per failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Mismatch(_) => EXIT_MISMATCH,
            Self::QueueCreate { .. } => EXIT_QUEUE_CREATE,
            Self::RelaySpawn(_) => EXIT_RELAY_SPAWN,
            Self::IrqAttach { .. } => EXIT_IRQ_ATTACH,
            Self::TriggerSpawn(_) => EXIT_TRIGGER_SPAWN,
            Self::Relay { .. } | Self::Consume(_) => EXIT_RELAY,
            Self::Stalled { .. } => EXIT_STALLED,
            Self::Alloc { .. } => EXIT_ALLOC,
            Self::StackProbe { .. } => EXIT_STACK,
            Self::Config(_) | Self::Usage(_) => EXIT_USAGE,
        }
    }
}
