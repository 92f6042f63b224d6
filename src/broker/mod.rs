//! Broker controller.
//!
//! The broker owns the durable event log along with all durable consumers. Events are
//! appended with monotonically increasing sequence numbers starting at 1, and are never
//! rewritten. Consumers track their progress as an acked floor plus a set of point acks
//! above the floor, so redelivery after a crash is scoped to unacked events only.

#[cfg(test)]
mod mod_test;
pub mod consumer;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use sled::Tree;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use uuid::Uuid;

use crate::broker::consumer::{ConsumerCtl, ConsumerCtlMsg};
use crate::config::Config;
use crate::database::Database;
use crate::error::{ShutdownError, ERR_DB_FLUSH, ERR_ITER_FAILURE};
use crate::grpc::EventNotification;
use crate::models::broker::{ConsumerRecord, StoredEvent};
use crate::utils;

/// The key prefix used for storing log events.
///
/// NOTE: in order to preserve lexicographical ordering of keys, it is important to always use
/// the `utils::encode_byte_prefix*` methods.
pub const PREFIX_EVENT: &[u8; 1] = b"e";
/// The key prefix used for the secondary timestamp index over log events.
///
/// Index keys are the one-byte prefix, the i64 BE seconds timestamp, then the u64 BE
/// offset; values are the u64 BE offset.
pub const PREFIX_EVENT_TS: &[u8; 1] = b"t";
/// The key used to store the last written offset of the log.
pub const KEY_LAST_OFFSET: &[u8; 1] = b"l";
/// The key prefix used for storing consumer records.
pub const PREFIX_CONSUMER: &[u8; 1] = b"c";
/// The key prefix used for storing consumer acked floors.
pub const PREFIX_CONSUMER_FLOOR: &[u8; 1] = b"o";
/// The key prefix used for storing consumer point acks above the floor.
pub const PREFIX_CONSUMER_ACKS: &[u8; 1] = b"a";

pub(self) const METRIC_LAST_OFFSET: &str = "eventing_broker_last_offset";
pub(self) const METRIC_NUM_CONSUMERS: &str = "eventing_broker_num_consumers";

/// The starting point of a new durable consumer on the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStart {
    /// Start from the beginning of the log.
    Beginning,
    /// Start from the event with the given sequence number, inclusive.
    FromSequence(u64),
    /// Start from the first event at or after the given seconds timestamp.
    FromTimestamp(i64),
}

/// An event as delivered to an attached consumer session.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDelivery {
    /// The log offset of the event, used for acking.
    pub offset: u64,
    /// The notification payload.
    pub notification: EventNotification,
}

/// A controller encapsulating all logic for interacting with the event log & its consumers.
pub struct BrokerCtl {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The application's database system.
    _db: Database,
    /// The event log database tree.
    events_tree: Tree,
    /// The consumer state database tree.
    consumers_tree: Tree,

    /// A channel of inbound requests.
    requests_rx: ReceiverStream<BrokerCtlMsg>,
    /// A mapping of all live consumer controllers by consumer ID.
    consumers: HashMap<Uuid, ConsumerHandle>,

    /// A channel used for communicating the log's last written offset value.
    offset_signal: watch::Sender<u64>,
    /// A receiver held for cloning to newly spawned consumer controllers.
    offset_signal_rx: watch::Receiver<u64>,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
    /// A bool indicating that this controller needs to shutdown.
    descheduled: bool,

    /// The last written offset of the log.
    last_offset: u64,
}

/// A handle to a spawned consumer controller.
struct ConsumerHandle {
    tx: mpsc::Sender<ConsumerCtlMsg>,
    handle: JoinHandle<Result<()>>,
}

impl BrokerCtl {
    /// Create a new instance.
    pub async fn new(
        config: Arc<Config>, db: Database, shutdown_tx: broadcast::Sender<()>, requests_rx: mpsc::Receiver<BrokerCtlMsg>,
    ) -> Result<Self> {
        let events_tree = db.get_events_tree().await?;
        let consumers_tree = db.get_consumers_tree().await?;
        let recovery_data = recover_broker_state(events_tree.clone(), consumers_tree.clone()).await?;
        metrics::register_counter!(METRIC_LAST_OFFSET, metrics::Unit::Count, "the offset of the last event written to the log");
        metrics::register_gauge!(METRIC_NUM_CONSUMERS, metrics::Unit::Count, "the number of live durable consumers");
        metrics::counter!(METRIC_LAST_OFFSET, recovery_data.last_offset);

        let (offset_signal, offset_signal_rx) = watch::channel(recovery_data.last_offset);
        let mut this = Self {
            config,
            _db: db,
            events_tree,
            consumers_tree,
            requests_rx: ReceiverStream::new(requests_rx),
            consumers: HashMap::new(),
            offset_signal,
            offset_signal_rx,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            descheduled: false,
            last_offset: recovery_data.last_offset,
        };

        // Respawn controllers for all recovered durable consumers.
        for record in recovery_data.consumers {
            this.spawn_consumer(record).await?;
        }
        metrics::gauge!(METRIC_NUM_CONSUMERS, this.consumers.len() as f64);
        Ok(this)
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!("broker controller has started");

        loop {
            if self.descheduled {
                break;
            }
            tokio::select! {
                msg_opt = self.requests_rx.next() => self.handle_msg(msg_opt).await,
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine, draining all consumer controllers.
        for (id, consumer) in self.consumers.drain() {
            let _ = consumer.tx.send(ConsumerCtlMsg::Shutdown).await;
            if let Err(err) = consumer.handle.await {
                tracing::error!(error = ?err, ?id, "error shutting down consumer controller");
            }
        }
        tracing::debug!("broker controller has shutdown");
        Ok(())
    }

    /// Handle a broker controller message.
    #[tracing::instrument(level = "trace", skip(self, msg_opt))]
    async fn handle_msg(&mut self, msg_opt: Option<BrokerCtlMsg>) {
        let msg = match msg_opt {
            Some(msg) => msg,
            None => {
                let _res = self.shutdown_tx.send(());
                self.descheduled = true;
                return;
            }
        };
        match msg {
            BrokerCtlMsg::Publish { subject, notification, tx } => self.handle_publish(subject, notification, tx).await,
            BrokerCtlMsg::EnsureConsumer { id, subject_filter, start, tx } => self.handle_ensure_consumer(id, subject_filter, start, tx).await,
            BrokerCtlMsg::DeleteConsumer { id, tx } => self.handle_delete_consumer(id, tx).await,
            BrokerCtlMsg::GetConsumer { id, tx } => {
                let _res = tx.send(self.consumers.get(&id).map(|consumer| consumer.tx.clone()));
            }
        }
    }

    /// Handle a request to publish an event to the log.
    #[tracing::instrument(level = "trace", skip(self, subject, notification, tx))]
    async fn handle_publish(&mut self, subject: String, notification: EventNotification, tx: oneshot::Sender<Result<u64>>) {
        let res = self.publish_event(subject, notification).await;
        if let Err(err) = &res {
            tracing::error!(error = ?err, "error while publishing event to log");
            if err.downcast_ref::<ShutdownError>().is_some() {
                let _ = self.shutdown_tx.send(());
            }
        }
        let _res = tx.send(res);
    }

    /// Write the given event to the log, returning its assigned sequence number.
    async fn publish_event(&mut self, subject: String, mut notification: EventNotification) -> Result<u64> {
        let offset = self.last_offset + 1;
        notification.sequence = offset;
        let timestamp = notification.timestamp;
        let event = StoredEvent { subject, notification: Some(notification) };
        let encoded = utils::encode_model(&event).context("error encoding event record for storage")?;

        let mut batch = sled::Batch::default();
        batch.insert(&utils::encode_byte_prefix(PREFIX_EVENT, offset), encoded.as_slice());
        batch.insert(&encode_ts_index_key(timestamp, offset), &utils::encode_u64(offset));
        batch.insert(KEY_LAST_OFFSET, &utils::encode_u64(offset));
        self.events_tree
            .apply_batch(batch)
            .context("error applying event write batch")
            .map_err(ShutdownError::from)?;
        self.events_tree.flush_async().await.context(ERR_DB_FLUSH).map_err(ShutdownError::from)?;

        self.last_offset = offset;
        metrics::increment_counter!(METRIC_LAST_OFFSET);
        let _ = self.offset_signal.send(offset);
        Ok(offset)
    }

    /// Handle a request to ensure a durable consumer exists.
    ///
    /// This routine is idempotent with respect to the consumer ID. The starting point is
    /// only evaluated on first creation.
    #[tracing::instrument(level = "trace", skip(self, subject_filter, start, tx))]
    async fn handle_ensure_consumer(&mut self, id: Uuid, subject_filter: String, start: ConsumerStart, tx: oneshot::Sender<Result<()>>) {
        if self.consumers.contains_key(&id) {
            let _res = tx.send(Ok(()));
            return;
        }
        let res = self.create_consumer(id, subject_filter, start).await;
        if let Err(err) = &res {
            tracing::error!(error = ?err, "error while creating durable consumer");
            if err.downcast_ref::<ShutdownError>().is_some() {
                let _ = self.shutdown_tx.send(());
            }
        }
        let _res = tx.send(res);
    }

    async fn create_consumer(&mut self, id: Uuid, subject_filter: String, start: ConsumerStart) -> Result<()> {
        // Resolve the start position into an acked floor over the log.
        let floor = match start {
            ConsumerStart::Beginning => 0,
            ConsumerStart::FromSequence(seq) => seq.saturating_sub(1),
            ConsumerStart::FromTimestamp(ts) => {
                let (tree, last_offset) = (self.events_tree.clone(), self.last_offset);
                Database::spawn_blocking(move || -> Result<u64> {
                    let start_key = encode_ts_index_key(ts, 0);
                    let stop_key = [PREFIX_EVENT_TS[0] + 1];
                    for iter_res in tree.range(start_key.as_ref()..&stop_key[..]) {
                        let (_key, val) = iter_res.context(ERR_ITER_FAILURE)?;
                        let offset = utils::decode_u64(&val)?;
                        return Ok(offset.saturating_sub(1));
                    }
                    Ok(last_offset)
                })
                .await
                .map_err(anyhow::Error::from)??
            }
        };

        // Persist the consumer record & its initial floor.
        let record = ConsumerRecord {
            id: id.to_string(),
            subject_filter,
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        };
        let mut batch = sled::Batch::default();
        batch.insert(
            &utils::encode_uuid_prefix(PREFIX_CONSUMER, &id),
            utils::encode_model(&record).context("error encoding consumer record for storage")?.as_slice(),
        );
        batch.insert(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id), &utils::encode_u64(floor));
        self.consumers_tree
            .apply_batch(batch)
            .context("error writing consumer record to disk")
            .map_err(ShutdownError::from)?;
        self.consumers_tree.flush_async().await.context(ERR_DB_FLUSH).map_err(ShutdownError::from)?;

        self.spawn_consumer(record).await?;
        metrics::gauge!(METRIC_NUM_CONSUMERS, self.consumers.len() as f64);
        Ok(())
    }

    /// Handle a request to delete a durable consumer along with all of its state.
    #[tracing::instrument(level = "trace", skip(self, tx))]
    async fn handle_delete_consumer(&mut self, id: Uuid, tx: oneshot::Sender<Result<()>>) {
        if let Some(consumer) = self.consumers.remove(&id) {
            let _ = consumer.tx.send(ConsumerCtlMsg::Shutdown).await;
            if let Err(err) = consumer.handle.await {
                tracing::error!(error = ?err, "error shutting down consumer controller for deletion");
            }
        }
        metrics::gauge!(METRIC_NUM_CONSUMERS, self.consumers.len() as f64);

        let tree = self.consumers_tree.clone();
        let res = Database::spawn_blocking(move || -> Result<()> {
            let mut batch = sled::Batch::default();
            batch.remove(&utils::encode_uuid_prefix(PREFIX_CONSUMER, &id));
            batch.remove(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id));
            for iter_res in tree.scan_prefix(&utils::encode_uuid_prefix(PREFIX_CONSUMER_ACKS, &id)) {
                let (key, _val) = iter_res.context(ERR_ITER_FAILURE)?;
                batch.remove(key);
            }
            tree.apply_batch(batch).context("error purging consumer state from disk")?;
            tree.flush().context(ERR_DB_FLUSH)?;
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|res| res);
        if let Err(err) = &res {
            tracing::error!(error = ?err, "error deleting durable consumer");
        }
        let _res = tx.send(res);
    }

    /// Spawn a controller for the given durable consumer record.
    async fn spawn_consumer(&mut self, record: ConsumerRecord) -> Result<()> {
        let id = Uuid::parse_str(&record.id).context("malformed ID on consumer record")?;

        // Recover the consumer's progress from disk.
        let tree = self.consumers_tree.clone();
        let (floor, point_acks) = Database::spawn_blocking(move || -> Result<(u64, BTreeSet<u64>)> {
            let floor = tree
                .get(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id))
                .context("error fetching consumer floor")?
                .map(|val| utils::decode_u64(&val))
                .transpose()?
                .unwrap_or(0);
            let mut point_acks = BTreeSet::new();
            for iter_res in tree.scan_prefix(&utils::encode_uuid_prefix(PREFIX_CONSUMER_ACKS, &id)) {
                let (key, _val) = iter_res.context(ERR_ITER_FAILURE)?;
                point_acks.insert(utils::decode_u64(&key[17..])?);
            }
            Ok((floor, point_acks))
        })
        .await
        .map_err(anyhow::Error::from)??;

        let (tx, rx) = mpsc::channel(100);
        let handle = ConsumerCtl::new(
            self.config.clone(),
            self.events_tree.clone(),
            self.consumers_tree.clone(),
            id,
            record.subject_filter,
            floor,
            point_acks,
            self.last_offset,
            self.offset_signal_rx.clone(),
            self.shutdown_tx.clone(),
            tx.clone(),
            rx,
        )
        .spawn();
        self.consumers.insert(id, ConsumerHandle { tx, handle });
        Ok(())
    }
}

/// A message bound for the broker controller.
pub enum BrokerCtlMsg {
    /// A request to publish an event on the given subject.
    Publish {
        subject: String,
        notification: EventNotification,
        tx: oneshot::Sender<Result<u64>>,
    },
    /// A request to ensure a durable consumer exists for the given ID & filter.
    EnsureConsumer {
        id: Uuid,
        subject_filter: String,
        start: ConsumerStart,
        tx: oneshot::Sender<Result<()>>,
    },
    /// A request to delete a durable consumer along with all of its state.
    DeleteConsumer { id: Uuid, tx: oneshot::Sender<Result<()>> },
    /// A request to fetch a handle to the controller of the given consumer.
    GetConsumer {
        id: Uuid,
        tx: oneshot::Sender<Option<mpsc::Sender<ConsumerCtlMsg>>>,
    },
}

/// Recovered broker state.
pub struct BrokerRecovery {
    /// The last written offset of the log.
    pub last_offset: u64,
    /// All durable consumer records on disk.
    pub consumers: Vec<ConsumerRecord>,
}

/// Recover the broker's state from disk.
pub async fn recover_broker_state(events_tree: Tree, consumers_tree: Tree) -> Result<BrokerRecovery> {
    Database::spawn_blocking(move || -> Result<BrokerRecovery> {
        let last_offset = events_tree
            .get(KEY_LAST_OFFSET)
            .context("error fetching last offset of log")?
            .map(|val| utils::decode_u64(&val))
            .transpose()?
            .unwrap_or(0);
        let mut consumers = Vec::new();
        for iter_res in consumers_tree.scan_prefix(PREFIX_CONSUMER) {
            let (_key, val) = iter_res.context(ERR_ITER_FAILURE)?;
            consumers.push(utils::decode_model::<ConsumerRecord>(&val).context("error decoding consumer record from storage")?);
        }
        Ok(BrokerRecovery { last_offset, consumers })
    })
    .await
    .map_err(anyhow::Error::from)?
}

/// Encode a timestamp index key over the log.
pub fn encode_ts_index_key(ts: i64, offset: u64) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[0] = PREFIX_EVENT_TS[0];
    key[1..9].copy_from_slice(&utils::encode_i64(ts));
    key[9..17].copy_from_slice(&utils::encode_u64(offset));
    key
}
