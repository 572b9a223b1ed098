use std::sync::Arc;

use chrono::Utc;
use pgmq_core::{EngineError, JobPayload, MessageHeaders, MessageId, MessageStore};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Per-publish options.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Seconds the message stays hidden before first delivery.
    pub delay_seconds: i32,
    /// Header overrides; these win over the generated system headers.
    pub headers: Map<String, Value>,
}

/// Enqueues jobs with generated tracing headers.
///
/// `add` sends through the store's default connection. Callers that need the
/// enqueue inside their own transaction (outbox pattern) build the envelope
/// with [`Publisher::envelope`] and hand it to the store's executor-scoped
/// send themselves; if their transaction rolls back, no message is visible.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn MessageStore>,
    producer_id: String,
    app_version: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self {
            store,
            producer_id: format!("{}-{}", hostname, std::process::id()),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the `appVersion` header (defaults to this crate's version).
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    /// Idempotent queue creation, for hosts that publish before any worker
    /// has started polling the queue.
    pub async fn declare(&self, queue: &str) -> Result<(), EngineError> {
        self.store.create_queue_if_absent(queue).await
    }

    /// Enqueue one job. Errors propagate to the caller; there are no retries
    /// at this layer.
    pub async fn add(
        &self,
        queue: &str,
        job_name: &str,
        data: Value,
        options: AddOptions,
    ) -> Result<MessageId, EngineError> {
        let (payload, headers) = self.envelope(job_name, data, &options);
        let id = self
            .store
            .send(queue, &payload, &headers, options.delay_seconds)
            .await?;

        tracing::debug!(
            queue = %queue,
            job = %job_name,
            msg_id = id,
            message_id = %headers.message_id,
            "job enqueued"
        );
        Ok(id)
    }

    /// Build the payload envelope and merged headers without sending. The
    /// system headers are generated fresh; caller overrides win.
    pub fn envelope(
        &self,
        job_name: &str,
        data: Value,
        options: &AddOptions,
    ) -> (JobPayload, MessageHeaders) {
        let payload = JobPayload {
            job_name: job_name.to_string(),
            data,
        };

        let mut headers = MessageHeaders {
            message_id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            producer_id: self.producer_id.clone(),
            app_version: self.app_version.clone(),
            created_at: Utc::now().to_rfc3339(),
            extra: Map::new(),
        };
        headers.apply_overrides(options.headers.clone());

        (payload, headers)
    }
}
