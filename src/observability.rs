//! Logging and telemetry setup.
//!
//! The engine itself only *emits* telemetry (`tracing` spans and events,
//! `metrics` counters and histograms); embedding applications decide
//! where it goes. This module offers a ready-made subscriber setup for
//! binaries that do not bring their own.

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive, e.g. `"info"` or `"fiscus=debug"`. When absent,
    /// `RUST_LOG` is honored and `info` is the fallback.
    pub filter: Option<String>,
}

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when called twice or when another
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.set(()).is_err() {
        return Err(Error::InvalidInput(
            "logging already initialized".to_string(),
        ));
    }

    let filter = config.filter.as_ref().map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        |directive| EnvFilter::new(directive),
    );

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    result.map_err(|e| Error::InvalidInput(format!("install subscriber: {e}")))
}
