mod config;
mod heartbeat;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;
use crate::worker::{build_router, WorkerState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,common=debug,tower_http=info")),
        )
        .init();

    let config = WorkerConfig::parse();
    let worker_id = config.worker_id();

    let app = build_router(WorkerState {
        worker_id: worker_id.clone(),
    });

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("no se pudo escuchar en {}:{}", config.bind, config.port))?;
    info!("worker {} escuchando en {}", worker_id, listener.local_addr()?);

    // Registro + heartbeats hacia el coordinador
    match config.coordinator.clone() {
        Some(coordinator_url) => {
            tokio::spawn(heartbeat::run(
                Client::new(),
                coordinator_url,
                worker_id.clone(),
                config.advertise_url(),
                config.heartbeat_interval(),
            ));
        }
        None => warn!("sin --coordinator: el worker no se registra, hay que darlo de alta a mano"),
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
