mod config;
mod dispatch;
mod handlers;
mod monitor;
mod state;
mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CoordinatorConfig;
use crate::dispatch::Dispatcher;
use crate::handlers::{build_router, AppState};
use crate::state::Registry;
use crate::transport::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coordinator=debug,tower_http=info,axum=info")),
        )
        .init();

    let config = CoordinatorConfig::parse();

    let registry = Registry::new();
    for (id, url) in &config.workers {
        registry.register(id, url);
        info!("worker estático {} en {}", id, url);
    }

    let transport = Arc::new(
        HttpTransport::new(config.request_timeout()).context("creando cliente HTTP")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        transport.clone(),
        config.dispatch_config(),
    ));
    let monitor_config = config.monitor_config();

    // modo one-shot: procesa un archivo, imprime el resumen y sale
    if let Some(logfile) = config.logfile.as_deref() {
        // primera ronda de probes para no arrancar con todos en UNKNOWN
        monitor::probe_round(&registry, transport.as_ref(), &monitor_config).await;

        let monitor_handle = tokio::spawn(monitor::monitor_workers(
            registry.clone(),
            transport.clone(),
            monitor_config,
        ));

        let outcome = tokio::select! {
            res = dispatcher.distribute_report(logfile, config.chunk_bytes) => res,
            _ = tokio::signal::ctrl_c() => {
                warn!("distribución cancelada, se descartan los resultados parciales");
                monitor_handle.abort();
                return Ok(());
            }
        };
        monitor_handle.abort();

        return match outcome {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Err(e) => {
                error!("la distribución falló: {}", e);
                Err(e.into())
            }
        };
    }

    // monitor de salud en segundo plano
    tokio::spawn(monitor::monitor_workers(
        registry.clone(),
        transport.clone(),
        monitor_config,
    ));

    let app = build_router(AppState {
        registry,
        dispatcher,
    });

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("no se pudo escuchar en {}:{}", config.bind, config.port))?;
    info!("coordinador escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("apagando coordinador");
        })
        .await?;

    Ok(())
}
