// src/logging.rs

//! Logging setup for `devwatch` using `tracing` + `tracing-subscriber`.
//!
//! Filter selection, first match wins:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `DEVWATCH_LOG` environment variable, in `EnvFilter` directive syntax
//!    (e.g. `debug` or `devwatch::watch=trace,info`)
//! 3. `info`
//!
//! Logs are sent to STDERR; stdout carries the device lines.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "DEVWATCH_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level);

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_directive(level));
    }

    match std::env::var(LOG_ENV_VAR) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(spec.trim())
            .unwrap_or_else(|err| {
                eprintln!("ignoring invalid {LOG_ENV_VAR}={spec:?}: {err}");
                EnvFilter::new("info")
            }),
        _ => EnvFilter::new("info"),
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
