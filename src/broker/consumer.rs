//! Durable consumer controller.
//!
//! Each durable consumer tracks an acked floor over the log plus a set of point acks
//! above the floor. Events above the floor which match the consumer's subject filter are
//! delivered to exactly one attached session channel at a time; non-matching events are
//! acked in place so the floor can advance past them. An unacked delivery is requeued
//! when its session detaches or when its ack deadline passes.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use rand::seq::IteratorRandom;
use sled::Tree;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, Interval};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream, WatchStream};
use uuid::Uuid;

use crate::broker::{EventDelivery, PREFIX_CONSUMER_ACKS, PREFIX_CONSUMER_FLOOR, PREFIX_EVENT};
use crate::config::Config;
use crate::database::Database;
use crate::error::{ShutdownError, ShutdownResult, ERR_DB_FLUSH, ERR_ITER_FAILURE};
use crate::models::broker::StoredEvent;
use crate::subject;
use crate::utils;

/// The max number of events fetched from the log per delivery pass.
const FETCH_BATCH_SIZE: u64 = 100;
/// The interval on which pending delivery deadlines are swept.
const DEADLINE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// A controller managing delivery & ack state for a single durable consumer.
pub struct ConsumerCtl {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The event log database tree.
    events_tree: Tree,
    /// The consumer state database tree.
    consumers_tree: Tree,
    /// The ID of this consumer.
    id: Uuid,
    /// The subject filter of this consumer.
    subject_filter: String,

    /// The acked floor of this consumer. All events at or below this offset are settled.
    floor: u64,
    /// Acked offsets above the floor.
    point_acks: BTreeSet<u64>,
    /// Unacked deliveries currently out with a session channel.
    pending: HashMap<u64, PendingDelivery>,
    /// Offsets awaiting redelivery, oldest first.
    redelivery: VecDeque<u64>,
    /// The next log offset to fetch for fresh delivery.
    cursor: u64,
    /// The last written offset of the log.
    last_offset: u64,
    /// All attached session channels by channel ID.
    channels: HashMap<Uuid, mpsc::Sender<EventDelivery>>,
    /// A bool indicating if a log fetch is currently in flight.
    is_fetching: bool,

    /// A channel of messages to be processed by this controller.
    msgs_tx: mpsc::Sender<ConsumerCtlMsg>,
    /// A channel of messages to be processed by this controller.
    msgs_rx: ReceiverStream<ConsumerCtlMsg>,
    /// A signal from the broker on the log's last written offset value.
    log_offset: WatchStream<u64>,
    /// The ticker driving pending deadline sweeps.
    deadline_sweep: Interval,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
    /// A bool indicating that this controller needs to shutdown.
    descheduled: bool,
}

/// An unacked delivery held by a session channel.
struct PendingDelivery {
    /// The channel holding the delivery.
    chan_id: Uuid,
    /// The instant after which the delivery is considered lost.
    deadline: Instant,
}

impl ConsumerCtl {
    /// Create a new instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>, events_tree: Tree, consumers_tree: Tree, id: Uuid, subject_filter: String, floor: u64, point_acks: BTreeSet<u64>,
        last_offset: u64, log_offset: watch::Receiver<u64>, shutdown_tx: broadcast::Sender<()>, msgs_tx: mpsc::Sender<ConsumerCtlMsg>,
        msgs_rx: mpsc::Receiver<ConsumerCtlMsg>,
    ) -> Self {
        Self {
            config,
            events_tree,
            consumers_tree,
            id,
            subject_filter,
            cursor: floor + 1,
            floor,
            point_acks,
            pending: HashMap::new(),
            redelivery: VecDeque::new(),
            last_offset,
            channels: HashMap::new(),
            is_fetching: false,
            msgs_tx,
            msgs_rx: ReceiverStream::new(msgs_rx),
            log_offset: WatchStream::new(log_offset),
            deadline_sweep: tokio::time::interval(DEADLINE_SWEEP_INTERVAL),
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            descheduled: false,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(id = ?self.id, "consumer controller has started");

        loop {
            if self.descheduled {
                break;
            }
            tokio::select! {
                Some(msg) = self.msgs_rx.next() => self.handle_msg(msg).await,
                Some(offset) = self.log_offset.next() => self.handle_offset_update(offset).await,
                _ = self.deadline_sweep.tick() => self.handle_deadline_sweep().await,
                _ = self.shutdown_rx.next() => break,
            }
        }

        tracing::debug!(id = ?self.id, "consumer controller has shutdown");
        Ok(())
    }

    /// Handle a message sent to this controller.
    #[tracing::instrument(level = "trace", skip(self, msg))]
    async fn handle_msg(&mut self, msg: ConsumerCtlMsg) {
        match msg {
            ConsumerCtlMsg::Attach { chan_id, chan, tx } => {
                self.channels.insert(chan_id, chan);
                let _res = tx.send(());
                self.drive_delivery().await;
            }
            ConsumerCtlMsg::Detach { chan_id } => self.handle_detach(chan_id).await,
            ConsumerCtlMsg::Ack { offsets } => {
                self.handle_acks(offsets).await;
                self.drive_delivery().await;
            }
            ConsumerCtlMsg::Fetch(res) => self.handle_fetch_result(res).await,
            ConsumerCtlMsg::Shutdown => self.descheduled = true,
        }
    }

    /// Handle an update of the log's last written offset.
    #[tracing::instrument(level = "trace", skip(self, offset))]
    async fn handle_offset_update(&mut self, offset: u64) {
        self.last_offset = offset;
        self.drive_delivery().await;
    }

    /// Handle the detachment of a session channel, requeueing its unacked deliveries.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn handle_detach(&mut self, chan_id: Uuid) {
        self.channels.remove(&chan_id);
        let mut lost: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, delivery)| delivery.chan_id == chan_id)
            .map(|(offset, _)| *offset)
            .collect();
        lost.sort_unstable();
        for offset in lost {
            self.pending.remove(&offset);
            self.redelivery.push_back(offset);
        }
        self.drive_delivery().await;
    }

    /// Sweep pending deliveries whose ack deadline has passed back into the redelivery queue.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn handle_deadline_sweep(&mut self) {
        let now = Instant::now();
        let mut expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, delivery)| delivery.deadline <= now)
            .map(|(offset, _)| *offset)
            .collect();
        if !expired.is_empty() {
            expired.sort_unstable();
            tracing::debug!(id = ?self.id, count = expired.len(), "requeueing deliveries whose ack deadline passed");
            for offset in expired {
                self.pending.remove(&offset);
                self.redelivery.push_back(offset);
            }
        }
        self.drive_delivery().await;
    }

    /// Apply the given acks, advancing the floor as far as possible & persisting progress.
    #[tracing::instrument(level = "trace", skip(self, offsets))]
    async fn handle_acks(&mut self, offsets: Vec<u64>) {
        if offsets.is_empty() {
            return;
        }
        let mut new_acks = Vec::with_capacity(offsets.len());
        for offset in offsets {
            self.pending.remove(&offset);
            self.redelivery.retain(|queued| *queued != offset);
            if offset > self.floor && self.point_acks.insert(offset) {
                new_acks.push(offset);
            }
        }
        let mut consumed = Vec::new();
        while self.point_acks.remove(&(self.floor + 1)) {
            self.floor += 1;
            consumed.push(self.floor);
        }

        let mut batch = sled::Batch::default();
        batch.insert(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &self.id), &utils::encode_u64(self.floor));
        for offset in consumed {
            batch.remove(&utils::encode_uuid_u64_prefix(PREFIX_CONSUMER_ACKS, &self.id, offset));
        }
        for offset in new_acks.into_iter().filter(|offset| *offset > self.floor) {
            batch.insert(&utils::encode_uuid_u64_prefix(PREFIX_CONSUMER_ACKS, &self.id, offset), b"");
        }
        let res = self
            .consumers_tree
            .apply_batch(batch)
            .context("error updating consumer progress on disk")
            .map_err(ShutdownError::from);
        let res = match res {
            Ok(()) => self.consumers_tree.flush_async().await.context(ERR_DB_FLUSH).map_err(ShutdownError::from).map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = res {
            tracing::error!(error = ?err, "error persisting consumer progress");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Spawn a log fetch if there is deliverable work & no fetch already in flight.
    #[tracing::instrument(level = "trace", skip(self))]
    async fn drive_delivery(&mut self) {
        if self.is_fetching || self.channels.is_empty() {
            return;
        }
        let mut offsets: Vec<u64> = Vec::with_capacity(FETCH_BATCH_SIZE as usize);
        while offsets.len() < FETCH_BATCH_SIZE as usize {
            match self.redelivery.pop_front() {
                Some(offset) => offsets.push(offset),
                None => break,
            }
        }
        let budget = FETCH_BATCH_SIZE - offsets.len() as u64;
        let range = if budget > 0 && self.cursor <= self.last_offset {
            let stop = self.last_offset.min(self.cursor + budget - 1);
            Some((self.cursor, stop))
        } else {
            None
        };
        if offsets.is_empty() && range.is_none() {
            return;
        }
        self.is_fetching = true;
        Self::spawn_fetch(offsets, range, self.events_tree.clone(), self.msgs_tx.clone());
    }

    /// Spawn a blocking read of the log for the given explicit offsets & contiguous range.
    #[tracing::instrument(level = "trace", skip(offsets, range, tree, tx))]
    fn spawn_fetch(offsets: Vec<u64>, range: Option<(u64, u64)>, tree: Tree, tx: mpsc::Sender<ConsumerCtlMsg>) {
        tokio::spawn(async move {
            let res = Database::spawn_blocking(move || -> Result<FetchedEvents> {
                let mut events = Vec::with_capacity(offsets.len());
                for offset in offsets {
                    let val = tree
                        .get(&utils::encode_byte_prefix(PREFIX_EVENT, offset))
                        .context("error fetching event for redelivery")?;
                    if let Some(val) = val {
                        let event: StoredEvent = utils::decode_model(&val).context("error decoding event from storage")?;
                        events.push((offset, event));
                    }
                }
                let mut new_cursor = None;
                if let Some((start, stop)) = range {
                    for iter_res in tree.range(utils::encode_byte_prefix(PREFIX_EVENT, start)..=utils::encode_byte_prefix(PREFIX_EVENT, stop)) {
                        let (key, val) = iter_res.context(ERR_ITER_FAILURE)?;
                        let offset = utils::decode_u64(&key[1..])?;
                        let event: StoredEvent = utils::decode_model(&val).context("error decoding event from storage")?;
                        events.push((offset, event));
                    }
                    new_cursor = Some(stop + 1);
                }
                Ok(FetchedEvents { events, new_cursor })
            })
            .await
            .and_then(|res| res.map_err(ShutdownError::from));
            let _ = tx.send(ConsumerCtlMsg::Fetch(res)).await;
        });
    }

    /// Handle the result of a log fetch, delivering events to attached channels.
    #[tracing::instrument(level = "trace", skip(self, res))]
    async fn handle_fetch_result(&mut self, res: ShutdownResult<FetchedEvents>) {
        self.is_fetching = false;
        let fetched = match res {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::error!(error = ?err, "error while fetching events for consumer delivery");
                let _ = self.shutdown_tx.send(());
                return;
            }
        };
        if let Some(new_cursor) = fetched.new_cursor {
            self.cursor = new_cursor;
        }

        let mut auto_acks = Vec::new();
        let mut saturated = false;
        for (offset, event) in fetched.events {
            if offset <= self.floor || self.point_acks.contains(&offset) || self.pending.contains_key(&offset) {
                continue;
            }
            if !subject::subject_matches(&self.subject_filter, &event.subject) {
                auto_acks.push(offset);
                continue;
            }
            let notification = match event.notification {
                Some(notification) => notification,
                None => {
                    tracing::warn!(offset, "event record with no notification body, acking in place");
                    auto_acks.push(offset);
                    continue;
                }
            };
            if saturated {
                self.redelivery.push_back(offset);
                continue;
            }
            match self.try_deliver(EventDelivery { offset, notification }) {
                Some(chan_id) => {
                    let deadline = Instant::now() + self.config.ack_timeout();
                    self.pending.insert(offset, PendingDelivery { chan_id, deadline });
                }
                None => {
                    self.redelivery.push_back(offset);
                    saturated = true;
                }
            }
        }
        self.handle_acks(auto_acks).await;
        if !saturated {
            self.drive_delivery().await;
        }
    }

    /// Attempt to hand the given delivery to one attached channel, selected randomly.
    ///
    /// Channels which are at capacity are skipped; closed channels are dropped. Returns
    /// the accepting channel ID, else `None` when no channel could take the delivery.
    fn try_deliver(&mut self, mut delivery: EventDelivery) -> Option<Uuid> {
        let mut tried: HashSet<Uuid> = HashSet::new();
        loop {
            let chan_id = {
                let mut rng = rand::thread_rng();
                match self.channels.keys().filter(|chan_id| !tried.contains(*chan_id)).choose(&mut rng) {
                    Some(chan_id) => *chan_id,
                    None => return None,
                }
            };
            let chan = match self.channels.get(&chan_id) {
                Some(chan) => chan.clone(),
                None => continue,
            };
            match chan.try_send(delivery) {
                Ok(_) => return Some(chan_id),
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    delivery = returned;
                    tried.insert(chan_id);
                }
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    delivery = returned;
                    self.channels.remove(&chan_id);
                }
            }
        }
    }
}

/// A message bound for a consumer controller.
pub enum ConsumerCtlMsg {
    /// A session channel attaching to this consumer.
    Attach {
        chan_id: Uuid,
        chan: mpsc::Sender<EventDelivery>,
        tx: oneshot::Sender<()>,
    },
    /// A session channel detaching from this consumer.
    Detach { chan_id: Uuid },
    /// Acks for the given log offsets.
    Ack { offsets: Vec<u64> },
    /// A result from fetching events from the log for delivery.
    Fetch(ShutdownResult<FetchedEvents>),
    /// The parent broker is shutting down or deleting this consumer.
    Shutdown,
}

/// Events fetched from the log for delivery.
pub struct FetchedEvents {
    /// The fetched events paired with their log offsets.
    events: Vec<(u64, StoredEvent)>,
    /// The next offset to fetch for fresh delivery, if a range fetch took place.
    new_cursor: Option<u64>,
}
