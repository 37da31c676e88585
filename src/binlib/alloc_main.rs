// CLASSIFICATION: COMMUNITY
// Filename: alloc_main.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

use crate::error::ProbeError;
use crate::probe::heap;

use super::logging::init_logging;

/// CLI wrapper for `alloc_test`.
#[derive(Parser, Debug)]
#[command(name = "alloc_test", about = "Allocate and hold heap buffers", version = "0.1")]
pub struct Cli {
    /// Size of each buffer in bytes.
    pub buffer_size: usize,
    /// Number of buffers to allocate.
    pub buffers: usize,
    /// Release the buffers after this many seconds instead of holding forever.
    #[arg(long)]
    pub hold: Option<u64>,
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(cli: Cli) -> i32 {
    init_logging(cli.verbose);
    let report = match heap::exhaust(cli.buffer_size, cli.buffers) {
        Ok(report) => report,
        Err(e) => {
            if let ProbeError::Alloc { index, .. } = e {
                println!("Failed to allocate buffer {index}");
            }
            return e.exit_code();
        }
    };
    println!("{} buffers of size {} allocated", report.count(), report.buffer_size);
    info!("holding {} bytes", report.total_bytes());

    match cli.hold {
        Some(secs) => thread::sleep(Duration::from_secs(secs)),
        None => loop {
            thread::sleep(Duration::from_secs(3600));
        },
    }
    drop(report);
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sizes_and_hold() {
        let cli = Cli::parse_from(["alloc_test", "4096", "16", "--hold", "0"]);
        assert_eq!(cli.buffer_size, 4096);
        assert_eq!(cli.buffers, 16);
        assert_eq!(cli.hold, Some(0));
    }

    #[test]
    fn missing_count_is_a_usage_error() {
        assert!(Cli::try_parse_from(["alloc_test", "4096"]).is_err());
    }

    #[test]
    fn run_with_zero_hold_returns() {
        let cli = Cli::parse_from(["alloc_test", "64", "4", "--hold", "0"]);
        assert_eq!(run(cli), 0);
    }

    #[test]
    fn impossible_allocation_exits_with_alloc_code() {
        let size = (usize::MAX / 2).to_string();
        let cli = Cli::parse_from(["alloc_test", size.as_str(), "1", "--hold", "0"]);
        assert_eq!(run(cli), crate::error::EXIT_ALLOC);
    }
}
