//! Integration tests against a real Postgres with the pgmq extension
//! available. Set DATABASE_URL to run them.

use anyhow::Context;
use pgmq_core::{JobPayload, MessageHeaders, MessageStore};
use pgmq_postgres::PostgresStore;
use serde_json::{json, Map};
use serial_test::serial;
use uuid::Uuid;

async fn setup() -> anyhow::Result<(PostgresStore, String)> {
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for integration tests")?;

    let store = PostgresStore::connect(&database_url).await?;
    store.init().await?;

    // Fresh queue per test run so runs never see each other's messages.
    let queue = format!("t_{}", Uuid::new_v4().simple());
    store.create_queue_if_absent(&queue).await?;

    Ok((store, queue))
}

fn headers(message_id: &str) -> MessageHeaders {
    MessageHeaders {
        message_id: message_id.to_string(),
        correlation_id: "corr-1".to_string(),
        producer_id: "test-host-1".to_string(),
        app_version: "0.1.0".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        extra: Map::new(),
    }
}

fn payload(data: serde_json::Value) -> JobPayload {
    JobPayload {
        job_name: "test-job".to_string(),
        data,
    }
}

#[tokio::test]
#[serial]
async fn send_read_archive_round_trip() -> anyhow::Result<()> {
    let (store, queue) = setup().await?;

    let id = store
        .send(&queue, &payload(json!({"hello": "world"})), &headers("m-1"), 0)
        .await?;

    let batch = store.read(&queue, 30, 10).await?;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].read_count, 1);
    assert_eq!(batch[0].payload.job_name, "test-job");
    assert_eq!(batch[0].payload.data, json!({"hello": "world"}));
    assert_eq!(batch[0].headers.message_id, "m-1");

    store.archive(&queue, id).await?;

    // Archived messages never come back.
    let batch = store.read(&queue, 0, 10).await?;
    assert!(batch.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn read_count_increments_across_reads() -> anyhow::Result<()> {
    let (store, queue) = setup().await?;

    store
        .send(&queue, &payload(json!({})), &headers("m-1"), 0)
        .await?;

    // Zero visibility timeout: the message is immediately re-readable.
    let first = store.read(&queue, 0, 10).await?;
    assert_eq!(first[0].read_count, 1);

    let second = store.read(&queue, 0, 10).await?;
    assert_eq!(second[0].id, first[0].id);
    assert_eq!(second[0].read_count, 2);
    Ok(())
}

#[tokio::test]
#[serial]
async fn delayed_message_is_not_immediately_visible() -> anyhow::Result<()> {
    let (store, queue) = setup().await?;

    store
        .send(&queue, &payload(json!({})), &headers("m-1"), 60)
        .await?;

    let batch = store.read(&queue, 0, 10).await?;
    assert!(batch.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn rolled_back_transactional_send_is_invisible() -> anyhow::Result<()> {
    let (store, queue) = setup().await?;

    let mut tx = store.pool().begin().await?;
    PostgresStore::send_with(&mut *tx, &queue, &payload(json!({"n": 1})), &headers("m-1"), 0)
        .await?;
    tx.rollback().await?;

    let batch = store.read(&queue, 0, 10).await?;
    assert!(batch.is_empty(), "rolled-back enqueue must not be observable");

    // The committed case does land.
    let mut tx = store.pool().begin().await?;
    PostgresStore::send_with(&mut *tx, &queue, &payload(json!({"n": 2})), &headers("m-2"), 0)
        .await?;
    tx.commit().await?;

    let batch = store.read(&queue, 0, 10).await?;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].payload.data, json!({"n": 2}));
    Ok(())
}

#[tokio::test]
#[serial]
async fn delete_removes_without_archiving() -> anyhow::Result<()> {
    let (store, queue) = setup().await?;

    let id = store
        .send(&queue, &payload(json!({})), &headers("m-1"), 0)
        .await?;

    store.delete(&queue, id).await?;

    let batch = store.read(&queue, 0, 10).await?;
    assert!(batch.is_empty());

    // A second delete reports the miss.
    assert!(store.delete(&queue, id).await.is_err());
    Ok(())
}
