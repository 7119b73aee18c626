// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Relay server implementation

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use alias_relay_core::{
    application::registry::{AliasRegistry, RegistrySettings},
    domain::relay_config::RelayConfigManifest,
    infrastructure::{event_bus::InMemoryBus, snapshots::snapshot_store_for},
    presentation::{api, control::ControlSurface},
};

/// A fully wired relay, ready to serve
pub struct RelayServer {
    config: RelayConfigManifest,
    bus: Arc<InMemoryBus>,
    registry: Arc<AliasRegistry>,
    cancel: CancellationToken,
    control: JoinHandle<()>,
}

impl RelayServer {
    /// Build the bus, restore the registry and start the control surface
    pub async fn build(config: RelayConfigManifest) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let bus = Arc::new(InMemoryBus::new(config.spec.bus.channel_capacity));
        let store = snapshot_store_for(&config.snapshot_backend());

        let registry = AliasRegistry::open(bus.clone(), store, RegistrySettings::from_config(&config))
            .await
            .context("Failed to open alias registry")?;

        let cancel = CancellationToken::new();
        let control = ControlSurface::bind(bus.clone(), registry.clone())
            .await
            .context("Failed to bind alias control surface")?
            .spawn(cancel.clone());

        info!(
            relay = %config.metadata.name,
            prefix = %config.spec.control.prefix,
            aliases = registry.status().state.len(),
            "Alias relay ready"
        );

        Ok(Self {
            config,
            bus,
            registry,
            cancel,
            control,
        })
    }

    pub fn bus(&self) -> Arc<InMemoryBus> {
        self.bus.clone()
    }

    pub fn registry(&self) -> Arc<AliasRegistry> {
        self.registry.clone()
    }

    pub fn router(&self) -> Router {
        api::app(self.bus.clone(), self.registry.clone())
    }

    /// Serve the HTTP bridge until `shutdown` resolves, then stop the relay
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let network = &self.config.spec.network;
        let addr = format!("{}:{}", network.bind_address, network.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("HTTP bridge listening on {}", addr);

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed");

        self.shutdown().await;
        served
    }

    /// Stop the control surface and every mirror
    pub async fn shutdown(self) {
        info!("Alias relay shutting down");
        self.cancel.cancel();
        if let Err(e) = self.control.await {
            warn!("Control surface task ended abnormally: {}", e);
        }
        self.registry.shutdown().await;
    }
}

pub async fn start_relay(config: RelayConfigManifest) -> Result<()> {
    RelayServer::build(config).await?.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
