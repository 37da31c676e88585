// CLASSIFICATION: COMMUNITY
// Filename: logging.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use env_logger::Env;
use log::LevelFilter;

/// Initialise stderr logging. `RUST_LOG` wins over the default level.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}
