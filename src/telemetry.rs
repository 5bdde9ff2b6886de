//! Tracing initialisation.
//!
//! Console-only logging to stdout, filtered by the configured directive.
//! `RUST_LOG`, when set, takes precedence over the configuration so a
//! single run can be made more verbose without editing the environment file.

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, RuntimeConfig};

/// Installs the global subscriber.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return `false`.
pub fn init_tracing(config: &RuntimeConfig) -> bool {
    let filter = build_filter(&config.log_level);

    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(std::io::stdout().is_terminal())
            .with_filter(filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized");
        return false;
    }

    tracing::info!(
        environment = ?config.environment,
        log_format = ?config.log_format,
        "Logging initialized"
    );
    true
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}
