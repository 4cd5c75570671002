//! Bootstrap utilities for flowport binaries.
//!
//! Shared initialization code for all component binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Filter used with `--debug` when `FLOWPORT_LOG` is not set.
const VERBOSE_FILTER: &str = "debug";

/// Initialize tracing on stdout.
///
/// Diagnostics are either off or fully on. With `verbose` the filter comes
/// from `FLOWPORT_LOG`, defaulting to "debug".
pub fn init_tracing(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(log_filter(verbose))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .try_init();
}

fn log_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    if verbose {
        tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(VERBOSE_FILTER))
    } else {
        tracing_subscriber::EnvFilter::new("off")
    }
}
