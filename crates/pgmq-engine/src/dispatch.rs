use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use pgmq_core::{DeadLetterHeaders, EngineConfig, EngineError, Message, MessageStore};
use tokio::task::JoinSet;

use crate::metrics;
use crate::registry::Registry;

/// Scoped batch accounting: claims `count` in-flight slots, releases them on
/// drop so every exit path (including panics in the batch driver) settles the
/// counter.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
    count: usize,
}

impl InFlightGuard {
    fn claim(counter: Arc<AtomicUsize>, count: usize) -> Self {
        counter.fetch_add(count, Ordering::SeqCst);
        metrics::IN_FLIGHT_JOBS.add(count as i64);
        Self { counter, count }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(self.count, Ordering::SeqCst);
        metrics::IN_FLIGHT_JOBS.sub(self.count as i64);
    }
}

struct FailureInfo {
    error_type: String,
    error_message: String,
    stack_trace: Option<String>,
}

impl FailureInfo {
    fn stale() -> Self {
        Self {
            error_type: "StaleMessage".to_string(),
            error_message: "max retries exceeded (stale message)".to_string(),
            stack_trace: None,
        }
    }

    fn from_handler(err: &anyhow::Error) -> Self {
        Self {
            error_type: "HandlerError".to_string(),
            error_message: err.to_string(),
            stack_trace: Some(format!("{err:?}")),
        }
    }
}

/// Runs claimed batches and applies the retry/DLQ policy per message.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    store: Arc<dyn MessageStore>,
    registry: Arc<Registry>,
    config: EngineConfig,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<Registry>,
        config: EngineConfig,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            in_flight,
        }
    }

    /// Run every message of the batch concurrently and wait for all of them.
    /// Completion order within a batch is not guaranteed.
    pub(crate) async fn run_batch(&self, queue: &str, batch: Vec<Message>) {
        let _guard = InFlightGuard::claim(self.in_flight.clone(), batch.len());
        metrics::MESSAGES_READ.inc_by(batch.len() as u64);

        let mut tasks = JoinSet::new();
        for msg in batch {
            let dispatcher = self.clone();
            let queue = queue.to_string();
            tasks.spawn(async move { dispatcher.handle_message(&queue, msg).await });
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                tracing::error!(queue = %queue, error = %err, "job task panicked");
            }
        }
    }

    async fn handle_message(&self, queue: &str, msg: Message) {
        let job_name = msg.payload.job_name.clone();

        // Read count past the budget means a prior incarnation was claimed but
        // never resolved (e.g. crash mid-handling). One grace read is allowed
        // on top of max_retries before a message counts as stale.
        if msg.read_count > self.config.max_retries + 1 {
            tracing::warn!(
                queue = %queue,
                job = %job_name,
                msg_id = msg.id,
                read_count = msg.read_count,
                "stale message, escalating to DLQ without execution"
            );
            self.move_to_dlq(queue, &msg, FailureInfo::stale()).await;
            return;
        }

        let Some(handler) = self.registry.resolve(queue, &job_name) else {
            // Left untouched on purpose: once the missing handler is deployed
            // the message redelivers and processes without operator action.
            tracing::warn!(
                queue = %queue,
                job = %job_name,
                msg_id = msg.id,
                "no handler registered, leaving message for redelivery"
            );
            return;
        };
        let handler = handler.clone();

        tracing::debug!(queue = %queue, job = %job_name, msg_id = msg.id, "processing job");

        match handler(msg.clone()).await {
            Ok(()) => {
                if let Err(err) = self.store.archive(queue, msg.id).await {
                    // The visibility timeout will redeliver; handlers are
                    // required to be idempotent.
                    tracing::error!(
                        queue = %queue,
                        msg_id = msg.id,
                        error = %err,
                        "failed to archive completed message"
                    );
                } else {
                    metrics::MESSAGES_ARCHIVED.inc();
                }
            }
            Err(err) => {
                metrics::HANDLER_FAILURES.inc();
                tracing::error!(
                    queue = %queue,
                    job = %job_name,
                    msg_id = msg.id,
                    read_count = msg.read_count,
                    error = %err,
                    "job handler failed"
                );

                if msg.read_count >= self.config.max_retries {
                    tracing::warn!(
                        queue = %queue,
                        msg_id = msg.id,
                        read_count = msg.read_count,
                        "retry budget exhausted, moving to DLQ"
                    );
                    self.move_to_dlq(queue, &msg, FailureInfo::from_handler(&err))
                        .await;
                }
                // Otherwise: nothing. The message reappears after its
                // visibility window with read_count incremented by the store.
            }
        }
    }

    async fn move_to_dlq(&self, queue: &str, msg: &Message, failure: FailureInfo) {
        let dlq = format!("{queue}_dlq");
        let headers = DeadLetterHeaders {
            original: msg.headers.clone(),
            error_type: failure.error_type,
            error_message: failure.error_message,
            stack_trace: failure.stack_trace,
            failed_at: Utc::now().to_rfc3339(),
            retry_count: msg.read_count,
            original_queue: queue.to_string(),
        };

        match self.escalate(&dlq, queue, msg, &headers).await {
            Ok(()) => {
                metrics::MESSAGES_DEAD_LETTERED.inc();
                tracing::info!(queue = %queue, dlq = %dlq, msg_id = msg.id, "moved message to DLQ");
            }
            Err(err) => {
                // The original stays put and will surface again as stale; a
                // half-finished escalation must never lose the only copy.
                tracing::error!(
                    queue = %queue,
                    dlq = %dlq,
                    msg_id = msg.id,
                    error = %err,
                    "DLQ escalation failed, leaving original message in place"
                );
            }
        }
    }

    async fn escalate(
        &self,
        dlq: &str,
        queue: &str,
        msg: &Message,
        headers: &DeadLetterHeaders,
    ) -> Result<(), EngineError> {
        self.store.create_queue_if_absent(dlq).await?;
        let headers = serde_json::to_value(headers)?;
        self.store.send_raw(dlq, &msg.payload, &headers, 0).await?;
        self.store.delete(queue, msg.id).await?;
        Ok(())
    }
}
