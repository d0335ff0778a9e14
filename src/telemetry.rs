//! Structured logging setup for the binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, ScoutError};

/// Installs a JSON log subscriber on stderr.
///
/// `RUST_LOG` is honoured when set; otherwise the level is `info`, or `debug` for this
/// crate when `debug` is true. Stdout stays reserved for the model's answers.
pub fn init_tracing(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("cloudscout=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| ScoutError::Config(format!("failed to install log subscriber: {err}")))
}
