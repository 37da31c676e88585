// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Harness configuration.
//!
//! Defaults match the board configuration the test was written for and can
//! be overridden from the environment (`ISRMQ_*`) and then from the command
//! line.

use std::env;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::platform::{Irq, IRQ_SOFT, PRIO_SYSTEM};

pub const DEFAULT_ATTEMPTS: u32 = 10_000;
pub const DEFAULT_QUEUE_LEN: usize = 7;
pub const DEFAULT_PRIORITY: u8 = 100;
pub const DEFAULT_STACKSIZE: usize = 64 * 1024;
pub const DEFAULT_POLL_MS: u64 = 50;
pub const DEFAULT_STALL_MS: u64 = 5_000;

pub const QUEUE_ISR: &str = "isrmq";
pub const QUEUE_APP: &str = "appmq";
pub const NAME_RELAY: &str = "driver";

/// Faults the harness can inject to exercise its failure paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FaultInjection {
    #[default]
    None,
    /// Trigger without throttling, overrunning the ISR queue.
    Burst,
    /// The producer enqueues truncated messages; the relay treats the first
    /// one as a protocol violation.
    ShortMessages,
    /// The ISR acknowledges every interrupt but enqueues nothing, so the
    /// pipeline goes silent and the stall limit fires.
    LostMessages,
    /// The relay stops after forwarding this many messages.
    RelayLimit(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("queue length must be at least 1")]
    ZeroQueueLength,
    #[error("stack size must be non-zero")]
    ZeroStackSize,
    #[error("harness config lock poisoned")]
    LockPoisoned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Capacity of both the ISR and the application queue.
    pub queue_len: usize,
    /// Test priority; the trigger runs at half of it.
    pub priority: u8,
    /// Priority of the relay kthread.
    pub relay_priority: u8,
    /// Stack size for the relay and trigger threads.
    pub stack_size: usize,
    /// Receive timeout used by the consumer loop between progress checks.
    pub poll_interval: Duration,
    /// Time without progress after which the consumer gives up.
    pub stall_limit: Duration,
    pub isr_queue: String,
    pub app_queue: String,
    pub irq: Irq,
    pub fault: FaultInjection,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            queue_len: DEFAULT_QUEUE_LEN,
            priority: DEFAULT_PRIORITY,
            relay_priority: PRIO_SYSTEM,
            stack_size: DEFAULT_STACKSIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            stall_limit: Duration::from_millis(DEFAULT_STALL_MS),
            isr_queue: QUEUE_ISR.into(),
            app_queue: QUEUE_APP.into(),
            irq: IRQ_SOFT,
            fault: FaultInjection::None,
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with any `ISRMQ_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(v) = parse_env_number("ISRMQ_QUEUE_LEN")? {
            cfg.queue_len = v;
        }
        if let Some(v) = parse_env_number("ISRMQ_PRIORITY")? {
            cfg.priority = v;
        }
        if let Some(v) = parse_env_number("ISRMQ_STACKSIZE")? {
            cfg.stack_size = v;
        }
        if let Some(v) = parse_env_number("ISRMQ_POLL_MS")? {
            cfg.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_env_number("ISRMQ_STALL_MS")? {
            cfg.stall_limit = Duration::from_millis(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_len == 0 {
            return Err(ConfigError::ZeroQueueLength);
        }
        if self.stack_size == 0 {
            return Err(ConfigError::ZeroStackSize);
        }
        Ok(())
    }

    pub fn trigger_priority(&self) -> u8 {
        self.priority / 2
    }

    pub fn throttled(&self) -> bool {
        self.fault != FaultInjection::Burst
    }
}

fn parse_env_number<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.into(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

static CONFIG: Lazy<RwLock<HarnessConfig>> = Lazy::new(|| RwLock::new(HarnessConfig::default()));

/// Replace the process-wide harness configuration.
pub fn set_config(cfg: HarnessConfig) -> Result<(), ConfigError> {
    cfg.validate()?;
    let mut guard = CONFIG.write().map_err(|_| ConfigError::LockPoisoned)?;
    *guard = cfg;
    Ok(())
}

/// Get a clone of the process-wide harness configuration.
pub fn get_config() -> Result<HarnessConfig, ConfigError> {
    CONFIG
        .read()
        .map_err(|_| ConfigError::LockPoisoned)
        .map(|g| g.clone())
}
