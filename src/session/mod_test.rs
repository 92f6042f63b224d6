use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::ack::AckTracker;
use super::{apply_chunk_acks, handle_client_frame, run_chunker};
use crate::broker::consumer::ConsumerCtlMsg;
use crate::broker::EventDelivery;
use crate::config::Config;
use crate::error::RpcResult;
use crate::grpc::{
    EventKind, EventNotification, NotificationStreamInit, NotificationStreamRequest, NotificationStreamRequestAction,
    NotificationStreamResponse, ResourceKind,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct ChunkerHarness {
    deliveries_tx: mpsc::Sender<EventDelivery>,
    client_rx: mpsc::Receiver<RpcResult<NotificationStreamResponse>>,
    tracker: Arc<AckTracker>,
    shutdown_tx: broadcast::Sender<()>,
    _tmpdir: tempfile::TempDir,
}

fn setup_chunker(chunk_max_size: usize, chunk_timeout_millis: u64) -> Result<ChunkerHarness> {
    let (config, tmpdir) = Config::new_test()?;
    let mut config = (*config).clone();
    config.chunk_max_size = chunk_max_size;
    config.chunk_timeout_millis = chunk_timeout_millis;
    let config = Arc::new(config);

    let (deliveries_tx, deliveries_rx) = mpsc::channel(config.session_buffer_size);
    let (client_tx, client_rx) = mpsc::channel(100);
    let tracker = Arc::new(AckTracker::new(config.clone()));
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(run_chunker(
        config,
        deliveries_rx,
        tracker.clone(),
        client_tx,
        BroadcastStream::new(shutdown_tx.subscribe()),
    ));
    Ok(ChunkerHarness { deliveries_tx, client_rx, tracker, shutdown_tx, _tmpdir: tmpdir })
}

fn delivery(offset: u64) -> EventDelivery {
    EventDelivery {
        offset,
        notification: EventNotification {
            kind: EventKind::Updated as i32,
            resource_kind: ResourceKind::ObjectGroup as i32,
            resource_id: "some-resource".into(),
            timestamp: 100,
            payload: Vec::new(),
            sequence: offset,
        },
    }
}

async fn recv_chunk(rx: &mut mpsc::Receiver<RpcResult<NotificationStreamResponse>>) -> Result<NotificationStreamResponse> {
    let msg = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .context("timeout awaiting chunk")?
        .context("chunker channel closed")?;
    msg.map_err(|status| anyhow::anyhow!("unexpected error chunk: {}", status))
}

#[tokio::test]
async fn chunker_flushes_at_max_size() -> Result<()> {
    let mut harness = setup_chunker(3, 60_000)?;

    for offset in 1..=6 {
        harness.deliveries_tx.send(delivery(offset)).await?;
    }

    let first = recv_chunk(&mut harness.client_rx).await?;
    let second = recv_chunk(&mut harness.client_rx).await?;

    assert!(first.notifications.len() == 3, "expected 3 notifications in first chunk got {}", first.notifications.len());
    assert!(second.notifications.len() == 3, "expected 3 notifications in second chunk got {}", second.notifications.len());
    assert!(
        first.notifications[0].sequence == 1,
        "expected first chunk to start at sequence 1 got {}",
        first.notifications[0].sequence
    );
    assert!(
        second.notifications[0].sequence == 4,
        "expected second chunk to start at sequence 4 got {}",
        second.notifications[0].sequence
    );
    assert!(first.ack_chunk_id != second.ack_chunk_id, "expected distinct chunk IDs");

    Ok(())
}

#[tokio::test]
async fn chunker_flushes_partial_chunk_on_timeout() -> Result<()> {
    let mut harness = setup_chunker(100, 50)?;

    harness.deliveries_tx.send(delivery(1)).await?;
    harness.deliveries_tx.send(delivery(2)).await?;

    let chunk = recv_chunk(&mut harness.client_rx).await?;

    assert!(chunk.notifications.len() == 2, "expected 2 notifications in chunk got {}", chunk.notifications.len());
    let chunk_id = Uuid::parse_str(&chunk.ack_chunk_id)?;
    let offsets = harness.tracker.take(&chunk_id);
    assert!(offsets == Some(vec![1, 2]), "expected tracked offsets [1, 2] got {:?}", offsets);

    Ok(())
}

#[tokio::test]
async fn chunker_never_emits_empty_chunks() -> Result<()> {
    let mut harness = setup_chunker(10, 20)?;

    // Let several timeout windows pass without any deliveries.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let output = harness.client_rx.try_recv();
    assert!(output.is_err(), "expected no chunk to be emitted, got {:?}", output);

    harness.deliveries_tx.send(delivery(1)).await?;
    let chunk = recv_chunk(&mut harness.client_rx).await?;
    assert!(chunk.notifications.len() == 1, "expected 1 notification in chunk got {}", chunk.notifications.len());

    Ok(())
}

#[tokio::test]
async fn chunker_discards_buffered_events_on_shutdown() -> Result<()> {
    let mut harness = setup_chunker(100, 60_000)?;

    harness.deliveries_tx.send(delivery(1)).await?;
    harness.deliveries_tx.send(delivery(2)).await?;
    // Give the chunker a chance to buffer before signalling shutdown.
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.shutdown_tx.send(()).context("error sending shutdown signal")?;

    // The chunker drops its buffered deliveries & exits, so the client channel
    // closes without any final chunk.
    let output = tokio::time::timeout(RECV_TIMEOUT, harness.client_rx.recv())
        .await
        .context("timeout awaiting chunker channel close")?;
    assert!(output.is_none(), "expected no chunk after shutdown got {:?}", output);
    assert!(harness.tracker.len() == 0, "expected no tracked chunks got {}", harness.tracker.len());

    Ok(())
}

#[tokio::test]
async fn chunk_acks_resolve_atomically() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let tracker = AckTracker::new(config);
    let (consumer_tx, mut consumer_rx) = mpsc::channel(10);
    let chunk_id = Uuid::new_v4();
    tracker.insert(chunk_id, vec![4, 5, 6]);

    apply_chunk_acks(vec![chunk_id.to_string()], &tracker, &consumer_tx).await;

    let msg = tokio::time::timeout(RECV_TIMEOUT, consumer_rx.recv())
        .await
        .context("timeout awaiting consumer ack")?
        .context("consumer channel closed")?;
    match msg {
        ConsumerCtlMsg::Ack { offsets } => {
            assert!(offsets == vec![4, 5, 6], "expected offsets [4, 5, 6] got {:?}", offsets);
        }
        _ => panic!("expected an ack message"),
    }

    // A duplicate ack of the same chunk produces no further consumer traffic.
    apply_chunk_acks(vec![chunk_id.to_string()], &tracker, &consumer_tx).await;
    let dup = consumer_rx.try_recv();
    assert!(dup.is_err(), "expected no consumer message for duplicate ack");

    Ok(())
}

#[tokio::test]
async fn unexpected_frame_closes_stream_with_error() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let tracker = AckTracker::new(config);
    let (consumer_tx, mut consumer_rx) = mpsc::channel(10);
    let (client_tx, mut client_rx) = mpsc::channel::<RpcResult<NotificationStreamResponse>>(10);

    // A second init frame mid-stream is a protocol error.
    let req = NotificationStreamRequest {
        action: Some(NotificationStreamRequestAction::Init(NotificationStreamInit {
            stream_group_id: Uuid::new_v4().to_string(),
        })),
    };
    let keep_open = handle_client_frame(req, &tracker, &consumer_tx, &client_tx).await;
    assert!(!keep_open, "expected session to close on unexpected frame");

    let msg = tokio::time::timeout(RECV_TIMEOUT, client_rx.recv())
        .await
        .context("timeout awaiting error frame")?
        .context("client channel closed without error frame")?;
    let status = msg.err().context("expected an error frame for unexpected client frame")?;
    assert!(
        status.code() == tonic::Code::InvalidArgument,
        "expected invalid argument status got {:?}",
        status.code()
    );
    let pending = consumer_rx.try_recv();
    assert!(pending.is_err(), "expected no consumer traffic for unexpected frame");

    Ok(())
}

#[tokio::test]
async fn chunk_acks_ignore_unknown_ids() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let tracker = AckTracker::new(config);
    let (consumer_tx, mut consumer_rx) = mpsc::channel(10);

    apply_chunk_acks(vec![Uuid::new_v4().to_string(), "not-a-uuid".into()], &tracker, &consumer_tx).await;

    let output = consumer_rx.try_recv();
    assert!(output.is_err(), "expected no consumer message for unknown chunk IDs");

    Ok(())
}
