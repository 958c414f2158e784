// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! WARDEN - rank-based permission engine
//!
//! Main binary entry point.

use warden_bin::cli::Cli;
use warden_bin::commands::{execute, load_or_default};
use warden_bin::error::report_error_and_exit;
use warden_bin::logging::{init_logging, LogOptions};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Logging settings come from the file when it loads; the command itself
    // reports a broken file.
    let logging = load_or_default(&cli.config)
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(
        cli.effective_log_level(logging.level.as_str()),
        cli.effective_log_format(logging.format.into()),
        LogOptions::from(&logging),
    );

    if let Err(e) = execute(cli).await {
        report_error_and_exit(e);
    }
}
