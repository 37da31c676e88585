// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Library wrappers for the probe binaries.

pub mod alloc_main;
pub mod isrmq_main;
pub mod logging;
pub mod stack_main;

use clap::Parser;

use crate::error::EXIT_USAGE;

/// Parse the process arguments, exiting with [`EXIT_USAGE`] on a usage
/// error. `--help` and `--version` keep clap's own exit status.
pub fn parse_or_exit<C: Parser>() -> C {
    match C::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
        Err(e) => e.exit(),
    }
}
