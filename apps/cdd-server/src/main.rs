use std::sync::Arc;

use anyhow::Context;
use cdd_core::{load_config, Config};
use cdd_driver::DriverRegistry;
use cdd_memory_driver::MemoryDriver;
use tracing::{error, info};

mod identity;
mod router;

const DEFAULT_CONFIG: &str = "configs/contracts.toml";

#[tokio::main]
async fn main() {
    cdd_otel::init();
    if let Err(err) = run().await {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}

async fn run() -> anyhow::Result<()> {
    let path = std::env::var("CDD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let cfg: Config = load_config(&path).with_context(|| format!("loading {path}"))?;

    let memory = MemoryDriver::with_policy(cfg.storage.content_duplicates.clone());
    let drivers = DriverRegistry::new().with_driver(Arc::new(memory));
    let registry = cdd_core::bootstrap(&cfg, drivers).context("building contract registry")?;
    info!(contracts = registry.len(), config = %path, "contracts loaded");

    let addr = cfg.runtime.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router::build(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited")?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
