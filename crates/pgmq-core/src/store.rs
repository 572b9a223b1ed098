use async_trait::async_trait;

use crate::{EngineError, JobPayload, Message, MessageHeaders, MessageId};

/// Queue primitives the engine needs from the storage layer.
///
/// Durability, transactionality and visibility-timeout redelivery are the
/// store's responsibility; the engine only drives this interface.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Idempotent queue creation.
    async fn create_queue_if_absent(&self, queue: &str) -> Result<(), EngineError>;

    /// Append one message, hidden for `delay_seconds` before first delivery.
    /// Headers are an opaque JSON object at this layer so that dead-letter
    /// records (which carry extra diagnostic keys) go through the same path.
    async fn send_raw(
        &self,
        queue: &str,
        payload: &JobPayload,
        headers: &serde_json::Value,
        delay_seconds: i32,
    ) -> Result<MessageId, EngineError>;

    async fn send(
        &self,
        queue: &str,
        payload: &JobPayload,
        headers: &MessageHeaders,
        delay_seconds: i32,
    ) -> Result<MessageId, EngineError> {
        let headers = serde_json::to_value(headers)?;
        self.send_raw(queue, payload, &headers, delay_seconds).await
    }

    /// Read up to `batch_size` ready messages, hiding each for
    /// `visibility_timeout_secs`. Returned messages carry `read_count`
    /// already incremented for this read.
    async fn read(
        &self,
        queue: &str,
        visibility_timeout_secs: i32,
        batch_size: i64,
    ) -> Result<Vec<Message>, EngineError>;

    /// Terminal success: remove from the active queue into the archive.
    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), EngineError>;

    /// Hard delete. Used only as the second step of DLQ escalation, after the
    /// dead-letter copy has been confirmed sent.
    async fn delete(&self, queue: &str, id: MessageId) -> Result<(), EngineError>;
}
