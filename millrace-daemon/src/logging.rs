//! Tracing setup for the daemon.
//!
//! Millrace has two diagnostic channels: the per-asset trace sinks inside
//! each environment, and the daemon's own tracing output configured here.
//! Only the latter is governed by `[general]`; trace sinks are subscribed
//! through the router and never pass through the subscriber.

use anyhow::{bail, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use millrace_core::config::GeneralConfig;

/// Install the process-wide subscriber from the `[general]` settings.
///
/// A `RUST_LOG` environment filter wins over `log_level`, so operators can
/// raise verbosity without editing the config file. The global subscriber
/// can only be set once; a second call reports the conflict instead of
/// silently keeping the first.
pub fn init_tracing(general: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match general.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => bail!("log_format must be 'json' or 'pretty', got '{other}'"),
    }
    .map_err(|e| anyhow::anyhow!("tracing subscriber already installed: {e}"))
}
