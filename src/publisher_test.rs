use anyhow::{Context, Result};
use uuid::Uuid;

use crate::broker::PREFIX_EVENT;
use crate::catalog::CatalogStore;
use crate::error::AppError;
use crate::fixtures::{setup_broker, setup_hierarchy};
use crate::grpc::{EventKind, ResourceKind};
use crate::models::broker::StoredEvent;
use crate::publisher::EventPublisher;
use crate::utils;

#[tokio::test]
async fn publish_targets_exact_subject() -> Result<()> {
    let harness = setup_broker().await?;
    let catalog = CatalogStore::new(harness.db.get_catalog_tree().await?);
    let (project_id, dataset_id, group_id) = setup_hierarchy(&catalog)?;
    let publisher = EventPublisher::new(harness.config.clone(), catalog, harness.tx.clone());

    let sequence = publisher
        .publish(EventKind::Created, ResourceKind::ObjectGroup, &group_id.to_string(), b"created".to_vec())
        .await?;
    assert!(sequence == 1, "expected first published sequence to be 1 got {}", sequence);

    let events_tree = harness.db.get_events_tree().await?;
    let stored = events_tree
        .get(&utils::encode_byte_prefix(PREFIX_EVENT, sequence))?
        .context("expected stored event record, got None")?;
    let event: StoredEvent = utils::decode_model(&stored)?;

    let expected_subject = format!("UPDATES.{}.{}.{}", project_id, dataset_id, group_id);
    assert!(event.subject == expected_subject, "expected subject {} got {}", expected_subject, event.subject);
    let notification = event.notification.context("expected notification body, got None")?;
    assert!(notification.sequence == 1, "expected notification sequence to be 1 got {}", notification.sequence);
    assert!(
        notification.kind == EventKind::Created as i32,
        "expected notification kind {} got {}",
        EventKind::Created as i32,
        notification.kind
    );
    assert!(
        notification.resource_id == group_id.to_string(),
        "expected notification resource ID {} got {}",
        group_id,
        notification.resource_id
    );
    assert!(notification.payload == b"created".to_vec(), "expected notification payload to be preserved");

    Ok(())
}

#[tokio::test]
async fn publish_unknown_resource() -> Result<()> {
    let harness = setup_broker().await?;
    let catalog = CatalogStore::new(harness.db.get_catalog_tree().await?);
    let publisher = EventPublisher::new(harness.config.clone(), catalog, harness.tx.clone());

    let res = publisher
        .publish(EventKind::Updated, ResourceKind::Dataset, &Uuid::new_v4().to_string(), Vec::new())
        .await;

    let err = res.expect_err("expected publish for unknown resource to fail");
    let app_err = err.downcast_ref::<AppError>();
    assert!(
        matches!(app_err, Some(AppError::ResourceNotFound)),
        "expected ResourceNotFound error, got {:?}",
        app_err
    );

    Ok(())
}
