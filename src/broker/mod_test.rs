use anyhow::Result;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{recover_broker_state, BrokerCtlMsg, ConsumerStart, PREFIX_CONSUMER_FLOOR};
use crate::config::Config;
use crate::database::Database;
use crate::fixtures::{publish, setup_broker};
use crate::utils;

#[tokio::test]
async fn recover_broker_state_empty_state() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let db = Database::new(config).await?;

    let output = recover_broker_state(db.get_events_tree().await?, db.get_consumers_tree().await?).await?;

    assert!(output.last_offset == 0, "expected last offset to be 0 got {}", output.last_offset);
    assert!(output.consumers.is_empty(), "expected consumers len to be 0 got {}", output.consumers.len());

    Ok(())
}

#[tokio::test]
async fn publish_assigns_monotonic_sequences() -> Result<()> {
    let harness = setup_broker().await?;

    let first = publish(&harness.tx, "A.one", 100).await?;
    let second = publish(&harness.tx, "A.two", 200).await?;
    let third = publish(&harness.tx, "A.three", 300).await?;

    assert!(first == 1, "expected first sequence to be 1 got {}", first);
    assert!(second == 2, "expected second sequence to be 2 got {}", second);
    assert!(third == 3, "expected third sequence to be 3 got {}", third);

    let output = recover_broker_state(harness.db.get_events_tree().await?, harness.db.get_consumers_tree().await?).await?;
    assert!(output.last_offset == 3, "expected recovered last offset to be 3 got {}", output.last_offset);

    Ok(())
}

#[tokio::test]
async fn ensure_consumer_idempotent_and_recoverable() -> Result<()> {
    let harness = setup_broker().await?;
    let id = Uuid::new_v4();

    for _ in 0..2 {
        let (res_tx, res_rx) = oneshot::channel();
        harness
            .tx
            .send(BrokerCtlMsg::EnsureConsumer {
                id,
                subject_filter: "A.*".into(),
                start: ConsumerStart::Beginning,
                tx: res_tx,
            })
            .await?;
        res_rx.await??;
    }

    let (res_tx, res_rx) = oneshot::channel();
    harness.tx.send(BrokerCtlMsg::GetConsumer { id, tx: res_tx }).await?;
    let consumer = res_rx.await?;
    assert!(consumer.is_some(), "expected consumer controller handle, got None");

    let output = recover_broker_state(harness.db.get_events_tree().await?, harness.db.get_consumers_tree().await?).await?;
    assert!(output.consumers.len() == 1, "expected 1 recovered consumer got {}", output.consumers.len());
    assert!(
        output.consumers[0].id == id.to_string(),
        "expected recovered consumer ID {} got {}",
        id,
        output.consumers[0].id
    );

    Ok(())
}

#[tokio::test]
async fn ensure_consumer_from_timestamp_floor() -> Result<()> {
    let harness = setup_broker().await?;
    publish(&harness.tx, "A.one", 100).await?;
    publish(&harness.tx, "A.two", 200).await?;
    publish(&harness.tx, "A.three", 300).await?;

    let id = Uuid::new_v4();
    let (res_tx, res_rx) = oneshot::channel();
    harness
        .tx
        .send(BrokerCtlMsg::EnsureConsumer {
            id,
            subject_filter: "A.*".into(),
            start: ConsumerStart::FromTimestamp(200),
            tx: res_tx,
        })
        .await?;
    res_rx.await??;

    let consumers_tree = harness.db.get_consumers_tree().await?;
    let floor = consumers_tree
        .get(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id))?
        .map(|val| utils::decode_u64(&val))
        .transpose()?;
    assert!(floor == Some(1), "expected persisted floor to be Some(1) got {:?}", floor);

    Ok(())
}

#[tokio::test]
async fn ensure_consumer_from_sequence_floor() -> Result<()> {
    let harness = setup_broker().await?;
    for idx in 0..5 {
        publish(&harness.tx, "A.sub", 100 + idx).await?;
    }

    let id = Uuid::new_v4();
    let (res_tx, res_rx) = oneshot::channel();
    harness
        .tx
        .send(BrokerCtlMsg::EnsureConsumer {
            id,
            subject_filter: "A.*".into(),
            start: ConsumerStart::FromSequence(4),
            tx: res_tx,
        })
        .await?;
    res_rx.await??;

    let consumers_tree = harness.db.get_consumers_tree().await?;
    let floor = consumers_tree
        .get(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id))?
        .map(|val| utils::decode_u64(&val))
        .transpose()?;
    assert!(floor == Some(3), "expected persisted floor to be Some(3) got {:?}", floor);

    Ok(())
}

#[tokio::test]
async fn ensure_consumer_from_sequence_beyond_head() -> Result<()> {
    let harness = setup_broker().await?;
    publish(&harness.tx, "A.one", 100).await?;
    publish(&harness.tx, "A.two", 200).await?;

    // A start sequence beyond the current head must stand as-is, so that events
    // published later with a lower sequence are still skipped.
    let id = Uuid::new_v4();
    let (res_tx, res_rx) = oneshot::channel();
    harness
        .tx
        .send(BrokerCtlMsg::EnsureConsumer {
            id,
            subject_filter: "A.*".into(),
            start: ConsumerStart::FromSequence(5),
            tx: res_tx,
        })
        .await?;
    res_rx.await??;

    let consumers_tree = harness.db.get_consumers_tree().await?;
    let floor = consumers_tree
        .get(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id))?
        .map(|val| utils::decode_u64(&val))
        .transpose()?;
    assert!(floor == Some(4), "expected persisted floor to be Some(4) got {:?}", floor);

    Ok(())
}

#[tokio::test]
async fn ensure_consumer_from_pre_epoch_timestamp_floor() -> Result<()> {
    let harness = setup_broker().await?;
    publish(&harness.tx, "A.one", 100).await?;
    publish(&harness.tx, "A.two", 200).await?;

    let id = Uuid::new_v4();
    let (res_tx, res_rx) = oneshot::channel();
    harness
        .tx
        .send(BrokerCtlMsg::EnsureConsumer {
            id,
            subject_filter: "A.*".into(),
            start: ConsumerStart::FromTimestamp(-50),
            tx: res_tx,
        })
        .await?;
    res_rx.await??;

    let consumers_tree = harness.db.get_consumers_tree().await?;
    let floor = consumers_tree
        .get(&utils::encode_uuid_prefix(PREFIX_CONSUMER_FLOOR, &id))?
        .map(|val| utils::decode_u64(&val))
        .transpose()?;
    assert!(floor == Some(0), "expected persisted floor to be Some(0) got {:?}", floor);

    Ok(())
}

#[tokio::test]
async fn delete_consumer_purges_state() -> Result<()> {
    let harness = setup_broker().await?;
    let id = Uuid::new_v4();
    let (res_tx, res_rx) = oneshot::channel();
    harness
        .tx
        .send(BrokerCtlMsg::EnsureConsumer {
            id,
            subject_filter: "A.*".into(),
            start: ConsumerStart::Beginning,
            tx: res_tx,
        })
        .await?;
    res_rx.await??;

    let (res_tx, res_rx) = oneshot::channel();
    harness.tx.send(BrokerCtlMsg::DeleteConsumer { id, tx: res_tx }).await?;
    res_rx.await??;

    let (res_tx, res_rx) = oneshot::channel();
    harness.tx.send(BrokerCtlMsg::GetConsumer { id, tx: res_tx }).await?;
    let consumer = res_rx.await?;
    assert!(consumer.is_none(), "expected consumer controller handle to be gone, got Some");

    let output = recover_broker_state(harness.db.get_events_tree().await?, harness.db.get_consumers_tree().await?).await?;
    assert!(output.consumers.is_empty(), "expected 0 recovered consumers got {}", output.consumers.len());

    Ok(())
}
