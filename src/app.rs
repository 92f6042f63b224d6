use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::broker::BrokerCtl;
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::database::Database;
use crate::groups::StreamGroupRegistry;
use crate::publisher::EventPublisher;
use crate::server::{spawn_http_server, AppServer};

/// The application object for when the eventing system is running as a server.
pub struct App {
    /// The application's runtime config.
    _config: Arc<Config>,
    /// The application's database system.
    _db: Database,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the broker controller.
    broker_handle: JoinHandle<Result<()>>,
    /// The join handle of the client gRPC server.
    client_server: JoinHandle<()>,
    /// The join handle of the HTTP server.
    http_server: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        // Initialize this node's storage.
        let db = Database::new(config.clone()).await.context("error opening database")?;

        // Spawn the broker controller.
        let (broker_tx, broker_rx) = mpsc::channel(1000);
        let broker = BrokerCtl::new(config.clone(), db.clone(), shutdown_tx.clone(), broker_rx)
            .await
            .context("error spawning broker controller")?;
        let broker_handle = broker.spawn();

        // Assemble the domain layers over storage & the broker.
        let catalog = CatalogStore::new(db.get_catalog_tree().await?);
        let registry = StreamGroupRegistry::new(config.clone(), catalog.clone(), db.get_stream_groups_tree().await?, broker_tx.clone());
        let publisher = EventPublisher::new(config.clone(), catalog.clone(), broker_tx.clone());

        let client_server = AppServer::new(config.clone(), catalog.clone(), registry, publisher, broker_tx, shutdown_tx.clone())
            .spawn()
            .context("error setting up client gRPC server")?;

        let http_server = spawn_http_server(config.clone(), catalog, shutdown_tx.subscribe());

        Ok(Self {
            _config: config,
            _db: db,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            broker_handle,
            client_server,
            http_server,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("eventing server is shutting down");
        if let Err(err) = self.broker_handle.await.context("error joining broker controller handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down broker controller");
        }
        if let Err(err) = self.client_server.await {
            tracing::error!(error = ?err, "error joining client gRPC server task");
        }
        if let Err(err) = self.http_server.await.context("error joining HTTP server handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down HTTP server");
        }

        tracing::debug!("eventing server shutdown complete");
        Ok(())
    }
}
