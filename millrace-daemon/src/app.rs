//! Application assembly -- catalog loading, route wiring, and the main loop.
//!
//! The [`App`] builds the router from the configured catalog directory,
//! registers the configured routes, and runs the ingest listener feeding
//! raw event strings into the router until shutdown.
//!
//! # Shutdown order (producers first)
//!
//! 1. Ingest listener stops accepting and reading connections
//! 2. The forward loop drains and exits
//! 3. Routes are removed, releasing their environments

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use millrace_core::MillraceConfig;
use millrace_engine::{DirCatalog, RoutePredicate, Router};
use millrace_ingest::{EventListener, ListenerConfig};

/// Capacity of the raw-event channel between the listener and the router.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The assembled daemon application.
pub struct App {
    config: MillraceConfig,
    router: Router<DirCatalog>,
    listener: EventListener,
    event_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl App {
    /// Load the catalog, wire the configured routes, and prepare the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog directory cannot be read or any
    /// configured route refers to an unknown environment or fails to build.
    pub async fn build(config: MillraceConfig, cancel: CancellationToken) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let catalog = DirCatalog::load(&config.engine.catalog_dir)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load catalog: {}", e))?;

        let mut router = Router::new(catalog);
        for route in &config.engine.routes {
            let predicate: Option<RoutePredicate> = route.queue.map(|queue| {
                Arc::new(move |event: &millrace_core::Event| event.queue() == Some(queue))
                    as RoutePredicate
            });
            router
                .add(&route.name, &route.environment, predicate)
                .map_err(|e| anyhow::anyhow!("failed to add route '{}': {}", route.name, e))?;
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let listener_config = ListenerConfig {
            bind_addr: config.server.bind_addr.clone(),
            max_connections: config.server.max_connections,
            max_frame_size: config.server.max_frame_size,
            connection_timeout_secs: config.server.connection_timeout_secs,
        };
        let listener = EventListener::new(listener_config, event_tx, cancel.clone());

        tracing::info!(
            routes = config.engine.routes.len(),
            environments = router.environment_names().len(),
            "application assembled"
        );

        Ok(Self {
            config,
            router,
            listener,
            event_rx,
            cancel,
        })
    }

    /// Bind the ingest listener and return the bound address.
    ///
    /// Optional; [`run`](App::run) binds implicitly when not called.
    /// Useful with port 0 to learn the assigned ephemeral port.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        self.listener
            .bind()
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind listener: {}", e))
    }

    /// The assembled router, exposed for integration tests.
    pub fn router(&self) -> &Router<DirCatalog> {
        &self.router
    }

    /// Run the ingest listener and the forward loop until cancellation.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            mut router,
            mut listener,
            mut event_rx,
            cancel,
        } = self;

        if !config.general.pid_file.is_empty() {
            write_pid_file(Path::new(&config.general.pid_file))?;
        }

        let listener_handle = tokio::spawn(async move { listener.run().await });

        tracing::info!("millrace-daemon running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = event_rx.recv() => match received {
                    Some(raw) => {
                        if let Err(e) = router.route_event(&raw) {
                            tracing::debug!(error = %e, "dropping malformed event");
                        }
                    }
                    None => break,
                },
            }
        }

        tracing::info!("shutting down");

        // 1. Stop the listener (producer) first
        cancel.cancel();
        match listener_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "listener exited with error"),
            Err(e) => tracing::error!(error = %e, "listener task panicked"),
        }

        // 2. Remove routes, releasing environments
        let routes: Vec<String> = router
            .route_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        for route in routes {
            if let Err(e) = router.remove(&route) {
                tracing::error!(route = %route, error = %e, "failed to remove route");
            }
        }

        if !config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&config.general.pid_file));
        }

        tracing::info!("millrace-daemon shut down");
        Ok(())
    }
}

/// Compile the named environment from the configured catalog and return
/// its Graphviz topology. Backs the `--print-graph` CLI flag.
pub async fn render_graph(config: &MillraceConfig, environment: &str) -> Result<String> {
    use millrace_engine::{build_graph, Catalog, Registry};

    let catalog = DirCatalog::load(&config.engine.catalog_dir)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load catalog: {}", e))?;
    let def = catalog
        .environment_definition(environment)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let graph = build_graph(&def, &Registry::with_defaults())
        .map_err(|e| anyhow::anyhow!("failed to build environment '{}': {}", environment, e))?;
    Ok(graph.print())
}

fn write_pid_file(path: &Path) -> Result<()> {
    std::fs::write(path, std::process::id().to_string())
        .map_err(|e| anyhow::anyhow!("failed to write pid file {}: {}", path.display(), e))
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove pid file");
    }
}
