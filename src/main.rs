//! The catalog eventing server.

mod app;
mod broker;
mod catalog;
mod config;
#[cfg(test)]
mod config_test;
mod database;
mod error;
#[cfg(test)]
mod fixtures;
mod groups;
mod grpc;
mod models;
mod publisher;
#[cfg(test)]
mod publisher_test;
mod server;
mod session;
mod signing;
mod subject;
mod utils;
#[cfg(test)]
mod utils_test;

use std::io::Write;
use std::mem::MaybeUninit;
use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true),
        )
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let cfg = Arc::new(Config::new()?);
    tracing::info!(
        client_port = %cfg.client_port,
        http_port = %cfg.http_port,
        subject_prefix = %cfg.subject_prefix,
        storage_data_path = %cfg.storage_data_path,
        "starting catalog eventing server",
    );

    // Install the metrics recorder before any controller registers its metrics.
    let recorder = get_metrics_recorder();
    metrics::set_recorder(recorder).context("error setting prometheus metrics recorder")?;

    let (shutdown_tx, _) = broadcast::channel(100);
    if let Err(err) = App::new(cfg, shutdown_tx).await?.spawn().await {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}

/// Get a handle to the metrics recorder, initializing it as needed.
pub fn get_metrics_recorder() -> &'static PrometheusRecorder {
    static mut RECORDER: MaybeUninit<PrometheusRecorder> = MaybeUninit::uninit();
    static ONCE: Once = Once::new();
    unsafe {
        ONCE.call_once(|| {
            RECORDER.write(PrometheusBuilder::new().build());
        });
        RECORDER.assume_init_ref()
    }
}
