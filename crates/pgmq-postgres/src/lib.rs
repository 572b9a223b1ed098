//! `MessageStore` implementation backed by the `pgmq` Postgres extension.
//!
//! All queue primitives map to pgmq's SQL API; connection pooling is sqlx's
//! job, and the pool supports concurrent reads, archives, deletes and sends
//! from every poll loop without external locking.

use chrono::{DateTime, Utc};
use pgmq_core::{EngineError, JobPayload, Message, MessageHeaders, MessageId, MessageStore};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::Database(e.to_string())
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Install the pgmq extension. Run once at boot.
    pub async fn init(&self) -> Result<(), EngineError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgmq CASCADE")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        tracing::info!("pgmq extension initialized");
        Ok(())
    }

    /// Send through a caller-supplied executor, typically an open transaction.
    /// This is the outbox-pattern entry point: if that transaction rolls
    /// back, the message is never visible to any poll loop.
    pub async fn send_with<'e, E>(
        executor: E,
        queue: &str,
        payload: &JobPayload,
        headers: &MessageHeaders,
        delay_seconds: i32,
    ) -> Result<MessageId, EngineError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let headers = serde_json::to_value(headers)?;
        send_raw_with(executor, queue, payload, &headers, delay_seconds).await
    }
}

async fn send_raw_with<'e, E>(
    executor: E,
    queue: &str,
    payload: &JobPayload,
    headers: &Value,
    delay_seconds: i32,
) -> Result<MessageId, EngineError>
where
    E: sqlx::PgExecutor<'e>,
{
    let payload = serde_json::to_value(payload)?;

    let row = sqlx::query("SELECT * FROM pgmq.send($1::text, $2::jsonb, $3::jsonb, $4::int)")
        .bind(queue)
        .bind(payload)
        .bind(headers)
        .bind(delay_seconds)
        .fetch_one(executor)
        .await
        .map_err(db_err)?;

    row.try_get::<i64, _>(0).map_err(db_err)
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<Message, EngineError> {
    let payload: Value = row.try_get("message").map_err(db_err)?;
    let headers: Value = row.try_get("headers").map_err(db_err)?;

    Ok(Message {
        id: row.try_get::<i64, _>("msg_id").map_err(db_err)?,
        read_count: row.try_get::<i32, _>("read_ct").map_err(db_err)?,
        enqueued_at: row
            .try_get::<DateTime<Utc>, _>("enqueued_at")
            .map_err(db_err)?,
        visible_at: row.try_get::<DateTime<Utc>, _>("vt").map_err(db_err)?,
        payload: serde_json::from_value(payload)?,
        headers: serde_json::from_value(headers)?,
    })
}

#[async_trait::async_trait]
impl MessageStore for PostgresStore {
    async fn create_queue_if_absent(&self, queue: &str) -> Result<(), EngineError> {
        sqlx::query("SELECT pgmq.create_non_partitioned($1::text)")
            .bind(queue)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn send_raw(
        &self,
        queue: &str,
        payload: &JobPayload,
        headers: &Value,
        delay_seconds: i32,
    ) -> Result<MessageId, EngineError> {
        send_raw_with(&self.pool, queue, payload, headers, delay_seconds).await
    }

    async fn read(
        &self,
        queue: &str,
        visibility_timeout_secs: i32,
        batch_size: i64,
    ) -> Result<Vec<Message>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT msg_id, read_ct, enqueued_at, vt, message, headers
            FROM pgmq.read($1::text, $2::int, $3::int)
            "#,
        )
        .bind(queue)
        .bind(visibility_timeout_secs)
        .bind(batch_size as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), EngineError> {
        let row = sqlx::query("SELECT pgmq.archive($1::text, $2::bigint)")
            .bind(queue)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let archived: bool = row.try_get(0).map_err(db_err)?;
        if !archived {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, queue: &str, id: MessageId) -> Result<(), EngineError> {
        let row = sqlx::query("SELECT pgmq.delete($1::text, $2::bigint)")
            .bind(queue)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let deleted: bool = row.try_get(0).map_err(db_err)?;
        if !deleted {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }
}
