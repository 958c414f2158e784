// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Display options applied on top of the format.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    /// Include the event target.
    pub with_target: bool,
    /// Include file and line.
    pub with_file: bool,
    /// Include thread IDs.
    pub with_thread_ids: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            with_target: true,
            with_file: false,
            with_thread_ids: false,
        }
    }
}

impl From<&warden_config::LoggingConfig> for LogOptions {
    fn from(config: &warden_config::LoggingConfig) -> Self {
        Self {
            with_target: config.with_target,
            with_file: config.with_file,
            with_thread_ids: config.with_thread_ids,
        }
    }
}

/// Builds the filter: `RUST_LOG` wins, otherwise `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match "tokio=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Initializes the global subscriber.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_logging(level: &str, format: LogFormat, options: LogOptions) {
    let filter = build_filter(level);
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());

    let result = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(options.with_target)
                    .with_thread_ids(options.with_thread_ids)
                    .with_file(options.with_file)
                    .with_line_number(options.with_file)
                    .with_ansi(is_terminal),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(options.with_target)
                    .with_thread_ids(options.with_thread_ids)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_ansi(is_terminal),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
