//! Event publication.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};

use crate::broker::BrokerCtlMsg;
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::grpc::{EventKind, EventNotification, ResourceKind};
use crate::subject;

/// The publication seam between catalog mutations & the broker.
///
/// Every publication resolves the exact subject of the mutated resource from the
/// catalog's current hierarchy; wildcards never appear on the publication side.
#[derive(Clone)]
pub struct EventPublisher {
    /// The application's runtime config.
    config: Arc<Config>,
    /// A handle to the catalog store.
    catalog: CatalogStore,
    /// A channel to the broker controller.
    broker: mpsc::Sender<BrokerCtlMsg>,
}

impl EventPublisher {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, catalog: CatalogStore, broker: mpsc::Sender<BrokerCtlMsg>) -> Self {
        Self { config, catalog, broker }
    }

    /// Publish a notification for a mutation of the given resource.
    ///
    /// Returns the sequence number assigned to the event by the broker.
    #[tracing::instrument(level = "trace", skip(self, payload))]
    pub async fn publish(&self, kind: EventKind, resource_kind: ResourceKind, resource_id: &str, payload: Vec<u8>) -> Result<u64> {
        let subject = subject::resolve_subject(&self.catalog, &self.config.subject_prefix, resource_kind, resource_id, false)?;
        let notification = EventNotification {
            kind: kind as i32,
            resource_kind: resource_kind as i32,
            resource_id: resource_id.into(),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
            payload,
            sequence: 0,
        };
        let (tx, rx) = oneshot::channel();
        self.broker
            .send(BrokerCtlMsg::Publish { subject, notification, tx })
            .await
            .context("error sending publish request to broker")?;
        rx.await.context("broker dropped publish response channel")?
    }
}
