// CLASSIFICATION: COMMUNITY
// Filename: stack_main.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use clap::Parser;
use log::{error, info};

use crate::probe::stack;

use super::logging::init_logging;

/// CLI wrapper for `stack_test`.
#[derive(Parser, Debug)]
#[command(name = "stack_test", about = "Recurse to a given depth", version = "0.1")]
pub struct Cli {
    /// Depth of recursion.
    pub depth: u64,
    /// Stack size of the probe thread in bytes.
    #[arg(long)]
    pub stack_size: Option<usize>,
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(cli: Cli) -> i32 {
    init_logging(cli.verbose);
    println!("Recursion depth: {}", cli.depth);
    match stack::probe(cli.depth, cli.stack_size) {
        Ok(report) => {
            println!("Reached the base of recursion");
            info!(
                "{} frames, {} bytes, {} bytes/frame",
                report.frames,
                report.stack_bytes,
                report.bytes_per_frame()
            );
            0
        }
        Err(e) => {
            error!("stack_test: {e}");
            e.exit_code()
        }
    }
}
