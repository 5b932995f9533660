// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API server

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use devspace_core::presentation::api;

use crate::bootstrap;

#[derive(Args)]
pub struct ServeCommand {
    /// Bind address (default: api.bind_address from config)
    #[arg(long, env = "DEVSPACE_HOST")]
    pub host: Option<String>,

    /// Port (default: api.port from config)
    #[arg(long, env = "DEVSPACE_PORT")]
    pub port: Option<u16>,
}

pub async fn execute(command: ServeCommand, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = bootstrap::load_config(config_path)?;
    info!("Configuration loaded: {}", manifest.metadata.name);

    let host = command.host.unwrap_or_else(|| manifest.spec.api.bind_address.clone());
    let port = command.port.unwrap_or(manifest.spec.api.port);

    let orchestrator = bootstrap::wire(&manifest.spec).await?;
    let app = api::app(orchestrator);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Devspace API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
