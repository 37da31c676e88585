// CLASSIFICATION: COMMUNITY
// Filename: isrmq_main.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use clap::{Parser, ValueEnum};
use log::{debug, error};

use crate::config::{
    get_config, set_config, ConfigError, FaultInjection, HarnessConfig, DEFAULT_ATTEMPTS,
};
use crate::error::ProbeError;
use crate::isrmq::IsrmqTest;

use super::logging::init_logging;

/// Fault selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FaultArg {
    None,
    Burst,
    ShortMessages,
    LostMessages,
}

/// CLI wrapper for the `isrmq` test.
#[derive(Parser, Debug)]
#[command(name = "isrmq", about = "ISR to message queue relay test", version = "0.1")]
pub struct Cli {
    /// Number of interrupt/message round trips.
    #[arg(default_value_t = DEFAULT_ATTEMPTS)]
    pub attempts: u32,
    /// Capacity of both queues.
    #[arg(long)]
    pub queue_len: Option<usize>,
    /// Priority of the test task; the trigger runs at half of it.
    #[arg(long)]
    pub priority: Option<u8>,
    /// Stack size for the relay and trigger threads.
    #[arg(long)]
    pub stack_size: Option<usize>,
    #[arg(long, value_enum, default_value_t = FaultArg::None)]
    pub fault: FaultArg,
    /// Stop the relay after this many messages.
    #[arg(long, conflicts_with = "fault")]
    pub relay_limit: Option<u32>,
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Environment defaults with the command-line overrides applied.
    pub fn harness_config(&self) -> Result<HarnessConfig, ConfigError> {
        let mut cfg = HarnessConfig::from_env()?;
        if let Some(len) = self.queue_len {
            cfg.queue_len = len;
        }
        if let Some(prio) = self.priority {
            cfg.priority = prio;
        }
        if let Some(size) = self.stack_size {
            cfg.stack_size = size;
        }
        cfg.fault = match (self.fault, self.relay_limit) {
            (_, Some(limit)) => FaultInjection::RelayLimit(limit),
            (FaultArg::None, None) => FaultInjection::None,
            (FaultArg::Burst, None) => FaultInjection::Burst,
            (FaultArg::ShortMessages, None) => FaultInjection::ShortMessages,
            (FaultArg::LostMessages, None) => FaultInjection::LostMessages,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Publish the command-line configuration as the process-wide one.
pub fn install_config(cli: &Cli) -> Result<HarnessConfig, ConfigError> {
    set_config(cli.harness_config()?)?;
    get_config()
}

/// Run the test and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    init_logging(cli.verbose);
    let cfg = match install_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("isrmq: {e}");
            eprintln!("isrmq: {e}");
            return ProbeError::from(e).exit_code();
        }
    };
    let mut test = IsrmqTest::new(cfg);
    let c = test.config();
    debug!(
        "isrmq: queue_len={} prio={} stack={} fault={:?}",
        c.queue_len, c.priority, c.stack_size, c.fault
    );
    test.run(cli.attempts).exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ten_thousand_attempts() {
        let cli = Cli::parse_from(["isrmq"]);
        assert_eq!(cli.attempts, 10_000);
        assert_eq!(cli.fault, FaultArg::None);
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "isrmq",
            "500",
            "--queue-len",
            "1",
            "--fault",
            "burst",
            "-v",
        ]);
        assert_eq!(cli.attempts, 500);
        assert_eq!(cli.queue_len, Some(1));
        assert_eq!(cli.fault, FaultArg::Burst);
        assert!(cli.verbose);
    }

    #[test]
    fn relay_limit_selects_fault() {
        let cli = Cli::parse_from(["isrmq", "20", "--relay-limit", "5"]);
        let cfg = cli.harness_config().unwrap();
        assert_eq!(cfg.fault, FaultInjection::RelayLimit(5));
    }

    #[test]
    fn rejects_non_numeric_attempts() {
        assert!(Cli::try_parse_from(["isrmq", "many"]).is_err());
    }

    #[test]
    fn zero_queue_length_is_a_config_error() {
        let cli = Cli::parse_from(["isrmq", "--queue-len", "0"]);
        assert_eq!(cli.harness_config(), Err(ConfigError::ZeroQueueLength));
        assert_eq!(install_config(&cli), Err(ConfigError::ZeroQueueLength));
    }

    #[test]
    fn command_line_becomes_process_config() {
        let cli = Cli::parse_from(["isrmq", "--queue-len", "3", "--priority", "80"]);
        let cfg = install_config(&cli).unwrap();
        assert_eq!(cfg.queue_len, 3);
        assert_eq!(cfg.trigger_priority(), 40);
        assert_eq!(get_config().unwrap(), cfg);
    }
}
