//! Stream group registry.
//!
//! A stream group is the client-facing name for a durable broker consumer over the
//! subject of a catalog resource. The registry owns the mapping rows and keeps the
//! broker's consumer set in lockstep with them.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sled::Tree;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::broker::{BrokerCtlMsg, ConsumerStart};
use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::error::{AppError, ERR_DB_FLUSH};
use crate::grpc::{CreateStreamGroupRequest, ResourceKind, StreamGroupDeliveryPolicy};
use crate::models::broker::StreamGroupRecord;
use crate::subject;
use crate::utils;

/// The key prefix used for storing stream group rows.
pub const PREFIX_STREAM_GROUP: &[u8; 1] = b"g";

/// The registry of all stream groups.
#[derive(Clone)]
pub struct StreamGroupRegistry {
    /// The application's runtime config.
    config: Arc<Config>,
    /// A handle to the catalog store.
    catalog: CatalogStore,
    /// The stream groups database tree.
    tree: Tree,
    /// A channel to the broker controller.
    broker: mpsc::Sender<BrokerCtlMsg>,
}

impl StreamGroupRegistry {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, catalog: CatalogStore, tree: Tree, broker: mpsc::Sender<BrokerCtlMsg>) -> Self {
        Self { config, catalog, tree, broker }
    }

    /// Create a new stream group over the given resource.
    ///
    /// The target resource must belong to the given project, which is what scopes who
    /// may observe a resource's events.
    #[tracing::instrument(level = "trace", skip(self, req))]
    pub async fn create_stream_group(&self, req: CreateStreamGroupRequest) -> Result<StreamGroupRecord> {
        let project_id = subject::parse_resource_id(&req.project_id)?;
        let kind = match ResourceKind::from_i32(req.resource_kind) {
            Some(ResourceKind::Unspecified) | None => bail!(AppError::InvalidInput("unknown resource kind".into())),
            Some(kind) => kind,
        };
        let resource_id = subject::parse_resource_id(&req.resource_id)?;
        let chain = subject::resource_chain(&self.catalog, kind, &resource_id)?;
        if chain.project_id != project_id {
            bail!(AppError::PermissionDenied);
        }
        let subject = subject::subject_from_chain(&self.config.subject_prefix, &chain, req.include_sub_resources);

        // Materialize the group as a durable consumer on the broker.
        let id = Uuid::new_v4();
        let start = match req.delivery_policy {
            Some(StreamGroupDeliveryPolicy::FromTimestamp(ts)) => ConsumerStart::FromTimestamp(ts),
            Some(StreamGroupDeliveryPolicy::FromSequence(seq)) => ConsumerStart::FromSequence(seq),
            Some(StreamGroupDeliveryPolicy::All(_)) | None => ConsumerStart::Beginning,
        };
        let (tx, rx) = oneshot::channel();
        self.broker
            .send(BrokerCtlMsg::EnsureConsumer { id, subject_filter: subject.clone(), start, tx })
            .await
            .context("error sending consumer request to broker")?;
        rx.await.context("broker dropped consumer response channel")??;

        let record = StreamGroupRecord {
            id: id.to_string(),
            subject,
            use_sub_resource: req.include_sub_resources,
            project_id: project_id.to_string(),
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        };
        self.tree
            .insert(
                &utils::encode_uuid_prefix(PREFIX_STREAM_GROUP, &id),
                utils::encode_model(&record).context("error encoding stream group row for storage")?,
            )
            .context("error writing stream group row")?;
        self.tree.flush_async().await.context(ERR_DB_FLUSH)?;
        Ok(record)
    }

    /// Fetch the stream group of the given ID.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn get_stream_group(&self, id: &Uuid) -> Result<StreamGroupRecord> {
        self.tree
            .get(&utils::encode_uuid_prefix(PREFIX_STREAM_GROUP, id))
            .context("error fetching stream group row")?
            .map(|val| utils::decode_model(&val))
            .transpose()?
            .ok_or_else(|| AppError::ResourceNotFound.into())
    }

    /// Delete the stream group of the given ID along with its broker consumer.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn delete_stream_group(&self, id: &Uuid) -> Result<()> {
        // Ensure the row exists before touching the broker; reads on unknown IDs error uniformly.
        let _record = self.get_stream_group(id)?;
        let (tx, rx) = oneshot::channel();
        self.broker
            .send(BrokerCtlMsg::DeleteConsumer { id: *id, tx })
            .await
            .context("error sending consumer deletion to broker")?;
        rx.await.context("broker dropped consumer deletion response channel")??;

        self.tree
            .remove(&utils::encode_uuid_prefix(PREFIX_STREAM_GROUP, id))
            .context("error removing stream group row")?;
        self.tree.flush_async().await.context(ERR_DB_FLUSH)?;
        Ok(())
    }
}
