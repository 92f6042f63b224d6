//! Test fixtures.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broker::{BrokerCtl, BrokerCtlMsg};
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::database::Database;
use crate::grpc::{EventKind, EventNotification, ResourceKind};

/// A running broker controller plus the state needed to drive it in tests.
pub struct BrokerHarness {
    pub config: Arc<Config>,
    pub tx: mpsc::Sender<BrokerCtlMsg>,
    pub db: Database,
    pub shutdown_tx: broadcast::Sender<()>,
    pub handle: JoinHandle<Result<()>>,
    _tmpdir: tempfile::TempDir,
}

/// Spawn a broker controller backed by a temp dir database.
pub async fn setup_broker() -> Result<BrokerHarness> {
    let (config, tmpdir) = Config::new_test()?;
    let db = Database::new(config.clone()).await?;
    let (shutdown_tx, _) = broadcast::channel(100);
    let (tx, rx) = mpsc::channel(100);
    let handle = BrokerCtl::new(config.clone(), db.clone(), shutdown_tx.clone(), rx).await?.spawn();
    Ok(BrokerHarness { config, tx, db, shutdown_tx, handle, _tmpdir: tmpdir })
}

/// Build a notification body for the given resource & timestamp.
pub fn notification(resource_id: &str, timestamp: i64) -> EventNotification {
    EventNotification {
        kind: EventKind::Updated as i32,
        resource_kind: ResourceKind::ObjectGroup as i32,
        resource_id: resource_id.into(),
        timestamp,
        payload: Vec::new(),
        sequence: 0,
    }
}

/// Publish an event on the given subject, returning its assigned sequence.
pub async fn publish(tx: &mpsc::Sender<BrokerCtlMsg>, subject: &str, timestamp: i64) -> Result<u64> {
    let (res_tx, res_rx) = oneshot::channel();
    tx.send(BrokerCtlMsg::Publish {
        subject: subject.into(),
        notification: notification("some-resource", timestamp),
        tx: res_tx,
    })
    .await
    .context("error sending publish request")?;
    res_rx.await.context("publish response channel dropped")?
}

/// Seed a project, dataset & object group hierarchy, returning their IDs in that order.
pub fn setup_hierarchy(catalog: &CatalogStore) -> Result<(Uuid, Uuid, Uuid)> {
    let (project_id, dataset_id, group_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    catalog.create_project(project_id, "proteomics")?;
    catalog.create_dataset(dataset_id, project_id, "run-2024")?;
    catalog.create_object_group(group_id, dataset_id)?;
    Ok((project_id, dataset_id, group_id))
}
