use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use millrace_core::MillraceConfig;
use millrace_daemon::app::{render_graph, App};
use millrace_daemon::cli::DaemonCli;
use millrace_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = MillraceConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;

    // CLI overrides take precedence over the config file
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    if let Some(environment) = cli.print_graph {
        let dot = render_graph(&config, &environment).await?;
        print!("{dot}");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!("millrace-daemon starting");

    if config.metrics.enabled {
        metrics_server::start(&config.metrics)?;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let app = App::build(config, cancel).await?;
    app.run().await
}

/// Cancel the token on SIGINT (Ctrl+C) or SIGTERM (systemd, Docker).
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT received"),
                _ = sigterm.recv() => tracing::info!("SIGTERM received"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("SIGINT received");
        }

        cancel.cancel();
    });
}
