//! Log subscriber setup.
//!
//! `MTG_LOG` overrides the filter passed by the host, using the usual
//! `EnvFilter` directive syntax (`info`, `mtg_engine=debug`, ...).

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_ENV_VAR: &str = "MTG_LOG";

/// Subscriber installation failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directives did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber is already installed.
    #[error("subscriber init failed: {0}")]
    Init(String),
}

/// Install a fmt subscriber filtered by `MTG_LOG`, falling back to
/// `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<(), TelemetryError> {
    let env_filter = build_filter(default_filter)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(filter = %default_filter, "[mtg] tracing initialized");
    Ok(())
}

fn build_filter(default_filter: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| TelemetryError::Filter(e.to_string()))
}
