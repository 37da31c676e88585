// CLASSIFICATION: COMMUNITY
// Filename: isrmq.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use sysprobe::binlib::parse_or_exit;
use sysprobe::binlib::isrmq_main::{run, Cli};

fn main() {
    let cli: Cli = parse_or_exit();
    std::process::exit(run(cli));
}
