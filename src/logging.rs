//! Tracing initialization for the sample binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppResult, DsbsError};

/// Initialize a console subscriber.
///
/// `RUST_LOG` takes precedence; `default_level` is used when it is unset.
pub fn init(default_level: &str) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| DsbsError::Configuration(format!("invalid log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| DsbsError::Configuration(format!("failed to initialize tracing: {e}")))
}
