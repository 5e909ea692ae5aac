//! Prometheus scrape endpoint.
//!
//! The engine and ingest crates record through the `metrics` facade, which
//! is a no-op until a recorder exists. This module installs the
//! `metrics-exporter-prometheus` recorder together with its bundled HTTP
//! listener and registers the millrace metric descriptions, making the
//! `[metrics]` section the only switch between "counters go nowhere" and
//! "counters are scrapeable".

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

use millrace_core::config::MetricsConfig;

/// Start the scrape endpoint on `[metrics].bind_addr`.
///
/// Installs the process-global recorder, so calling this a second time
/// fails. The endpoint carries no authentication of its own; binding to a
/// wildcard address is allowed but flagged in the log.
pub fn start(config: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("bad [metrics] bind_addr '{}'", config.bind_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("could not start metrics exporter on {addr}"))?;
    millrace_core::metrics::describe_all();

    if addr.ip().is_unspecified() {
        tracing::warn!(%addr, "metrics endpoint listens on every interface without auth");
    }
    tracing::info!(%addr, "metrics exporter ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_bind_addr_is_reported() {
        let config = MetricsConfig {
            enabled: true,
            bind_addr: "nowhere".to_owned(),
        };
        let err = start(&config).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }
}
