//! Consumer sessions.
//!
//! A session binds one client's bidirectional notification stream to a durable consumer.
//! Deliveries from the consumer land in a bounded buffer, get grouped into chunks, and
//! are emitted with a chunk ID the client acks back. Detaching a session never loses
//! events: unacked deliveries are requeued on the consumer for other sessions.

pub mod ack;
#[cfg(test)]
mod mod_test;

use std::sync::Arc;

use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tonic::{Status, Streaming};
use uuid::Uuid;

use crate::broker::consumer::ConsumerCtlMsg;
use crate::broker::EventDelivery;
use crate::config::Config;
use crate::error::RpcResult;
use crate::grpc::{NotificationStreamRequest, NotificationStreamRequestAction, NotificationStreamResponse};
use crate::session::ack::AckTracker;

/// The max time to wait for session tasks to finish on teardown.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
/// The interval on which expired chunk acks are pruned.
const ACK_PRUNE_INTERVAL: Duration = Duration::from_secs(5);

/// A live consumer session over a client's notification stream.
pub struct ConsumerSession {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The ID of this session's channel on the consumer.
    chan_id: Uuid,
    /// A handle to the consumer controller this session is attached to.
    consumer: mpsc::Sender<ConsumerCtlMsg>,
    /// The client's response channel.
    client_tx: mpsc::Sender<RpcResult<NotificationStreamResponse>>,
    /// The client's request stream.
    client_rx: Streaming<NotificationStreamRequest>,
    /// A channel used for triggering application shutdown.
    app_shutdown: broadcast::Sender<()>,
}

impl ConsumerSession {
    /// Create a new instance.
    pub fn new(
        config: Arc<Config>, consumer: mpsc::Sender<ConsumerCtlMsg>, client_tx: mpsc::Sender<RpcResult<NotificationStreamResponse>>,
        client_rx: Streaming<NotificationStreamRequest>, app_shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            config,
            chan_id: Uuid::new_v4(),
            consumer,
            client_tx,
            client_rx,
            app_shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let Self { config, chan_id, consumer, client_tx, client_rx, app_shutdown } = self;
        tracing::debug!(?chan_id, "consumer session has started");

        // Attach a bounded delivery channel to the consumer.
        let (deliveries_tx, deliveries_rx) = mpsc::channel(config.session_buffer_size);
        let (attach_tx, attach_rx) = oneshot::channel();
        let attach_res = consumer
            .send(ConsumerCtlMsg::Attach { chan_id, chan: deliveries_tx, tx: attach_tx })
            .await;
        if attach_res.is_err() || attach_rx.await.is_err() {
            let _res = client_tx.send(Err(Status::failed_precondition("target stream group is no longer available"))).await;
            return;
        }

        // Spawn the chunker & ack-ingest tasks under a session-local shutdown signal.
        let tracker = Arc::new(AckTracker::new(config.clone()));
        let (session_shutdown, _) = broadcast::channel(1);
        let chunker = tokio::spawn(run_chunker(
            config.clone(),
            deliveries_rx,
            tracker.clone(),
            client_tx.clone(),
            BroadcastStream::new(session_shutdown.subscribe()),
        ));
        let acks = tokio::spawn(run_ack_ingest(
            client_rx,
            tracker,
            consumer.clone(),
            client_tx,
            BroadcastStream::new(session_shutdown.subscribe()),
        ));

        // Wait for either task to finish, or for application shutdown, then drain the rest.
        let mut app_shutdown_rx = BroadcastStream::new(app_shutdown.subscribe());
        let (mut chunker, mut acks) = (chunker, acks);
        let (mut chunker_done, mut acks_done) = (false, false);
        tokio::select! {
            _ = &mut chunker => chunker_done = true,
            _ = &mut acks => acks_done = true,
            _ = app_shutdown_rx.next() => (),
        }
        let _res = session_shutdown.send(());
        let deadline = Instant::now() + TASK_JOIN_TIMEOUT;
        if !chunker_done {
            if let Ok(Err(err)) = tokio::time::timeout_at(deadline, chunker).await {
                tracing::error!(error = ?err, "error joining consumer session chunker task");
            }
        }
        if !acks_done {
            if let Ok(Err(err)) = tokio::time::timeout_at(deadline, acks).await {
                tracing::error!(error = ?err, "error joining consumer session ack task");
            }
        }

        // Detach from the consumer; its unacked deliveries are requeued for other sessions.
        let _res = consumer.send(ConsumerCtlMsg::Detach { chan_id }).await;
        tracing::debug!(?chan_id, "consumer session has shutdown");
    }
}

/// Group deliveries into chunks & emit them on the client channel.
///
/// A chunk is flushed when it reaches the configured max size, or when the configured
/// timeout passes after its first event was buffered. Empty chunks are never emitted.
/// On session shutdown, buffered deliveries are discarded instead of flushed; they are
/// requeued on the consumer once the session detaches.
async fn run_chunker(
    config: Arc<Config>, mut deliveries: mpsc::Receiver<EventDelivery>, tracker: Arc<AckTracker>,
    client_tx: mpsc::Sender<RpcResult<NotificationStreamResponse>>, mut shutdown: BroadcastStream<()>,
) {
    let max_size = config.chunk_max_size;
    let mut buf: Vec<EventDelivery> = Vec::with_capacity(max_size);
    let mut flush_deadline = Instant::now();
    loop {
        if buf.is_empty() {
            tokio::select! {
                delivery_opt = deliveries.recv() => match delivery_opt {
                    Some(delivery) => {
                        buf.push(delivery);
                        flush_deadline = Instant::now() + config.chunk_timeout();
                    }
                    None => return,
                },
                _ = shutdown.next() => return,
            }
            continue;
        }
        if buf.len() >= max_size {
            if !flush_chunk(&mut buf, &tracker, &client_tx).await {
                return;
            }
            continue;
        }
        tokio::select! {
            delivery_opt = deliveries.recv() => match delivery_opt {
                Some(delivery) => buf.push(delivery),
                None => {
                    let _ = flush_chunk(&mut buf, &tracker, &client_tx).await;
                    return;
                }
            },
            _ = tokio::time::sleep_until(flush_deadline) => {
                if !flush_chunk(&mut buf, &tracker, &client_tx).await {
                    return;
                }
            }
            // Buffered deliveries are dropped here without a chunk; detaching from
            // the consumer requeues everything that was never acked.
            _ = shutdown.next() => return,
        }
    }
}

/// Flush the buffered deliveries as one chunk, returning `false` if the client is gone.
async fn flush_chunk(
    buf: &mut Vec<EventDelivery>, tracker: &AckTracker, client_tx: &mpsc::Sender<RpcResult<NotificationStreamResponse>>,
) -> bool {
    if buf.is_empty() {
        return true;
    }
    let chunk_id = Uuid::new_v4();
    let offsets: Vec<u64> = buf.iter().map(|delivery| delivery.offset).collect();
    let notifications = buf.drain(..).map(|delivery| delivery.notification).collect();
    tracker.insert(chunk_id, offsets);
    let msg = NotificationStreamResponse {
        ack_chunk_id: chunk_id.to_string(),
        notifications,
    };
    if let Err(err) = client_tx.send(Ok(msg)).await {
        tracing::debug!(error = ?err, "client channel closed while emitting chunk");
        return false;
    }
    true
}

/// Ingest chunk acks from the client's request stream & forward them to the consumer.
async fn run_ack_ingest(
    mut client_rx: Streaming<NotificationStreamRequest>, tracker: Arc<AckTracker>, consumer: mpsc::Sender<ConsumerCtlMsg>,
    client_tx: mpsc::Sender<RpcResult<NotificationStreamResponse>>, mut shutdown: BroadcastStream<()>,
) {
    let mut prune = tokio::time::interval(ACK_PRUNE_INTERVAL);
    loop {
        tokio::select! {
            msg_opt = client_rx.next() => match msg_opt {
                Some(Ok(req)) => {
                    if !handle_client_frame(req, &tracker, &consumer, &client_tx).await {
                        return;
                    }
                }
                Some(Err(err)) => {
                    tracing::debug!(error = ?err, "error from client notification stream");
                    return;
                }
                None => return,
            },
            _ = prune.tick() => {
                let pruned = tracker.expire();
                if pruned > 0 {
                    tracing::debug!(pruned, "pruned expired chunk acks");
                }
            }
            _ = shutdown.next() => return,
        }
    }
}

/// Handle one frame from the client, returning `false` when the session should close.
///
/// Any frame other than an ack or a close is a protocol error which terminates the
/// session with an error sent to the client.
async fn handle_client_frame(
    req: NotificationStreamRequest, tracker: &AckTracker, consumer: &mpsc::Sender<ConsumerCtlMsg>,
    client_tx: &mpsc::Sender<RpcResult<NotificationStreamResponse>>,
) -> bool {
    match req.action {
        Some(NotificationStreamRequestAction::Ack(ack)) => {
            apply_chunk_acks(ack.chunk_ids, tracker, consumer).await;
            true
        }
        Some(NotificationStreamRequestAction::Close(_empty)) => false,
        _ => {
            tracing::warn!("protocol error, expected ack or close frame from client");
            let _res = client_tx
                .send(Err(Status::invalid_argument("protocol error, expected ack or close frame")))
                .await;
            false
        }
    }
}

/// Resolve the given chunk IDs against the tracker & ack their offsets on the consumer.
///
/// Unknown or already-acked chunk IDs are ignored.
async fn apply_chunk_acks(chunk_ids: Vec<String>, tracker: &AckTracker, consumer: &mpsc::Sender<ConsumerCtlMsg>) {
    let mut offsets = Vec::new();
    for chunk_id in chunk_ids {
        let chunk_id = match Uuid::parse_str(&chunk_id) {
            Ok(chunk_id) => chunk_id,
            Err(_) => {
                tracing::warn!(%chunk_id, "malformed chunk ID in ack frame");
                continue;
            }
        };
        if let Some(mut chunk_offsets) = tracker.take(&chunk_id) {
            offsets.append(&mut chunk_offsets);
        }
    }
    if !offsets.is_empty() {
        let _res = consumer.send(ConsumerCtlMsg::Ack { offsets }).await;
    }
}
