use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pgmq_core::{EngineConfig, MessageStore};

use crate::dispatch::Dispatcher;

/// Polls one queue while `running` holds. Busy queues are polled back-to-back;
/// an empty read sleeps `idle_poll_interval` before the next attempt.
pub(crate) async fn poll_queue(
    queue: String,
    store: Arc<dyn MessageStore>,
    dispatcher: Dispatcher,
    config: EngineConfig,
    running: Arc<AtomicBool>,
) {
    tracing::info!(queue = %queue, "poll loop started");

    while running.load(Ordering::SeqCst) {
        let batch = match store
            .read(&queue, config.visibility_timeout_secs, config.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                // A failed read is "no messages this iteration"; the loop
                // must outlive transient store trouble.
                tracing::warn!(queue = %queue, error = %err, "poll read failed");
                Vec::new()
            }
        };

        if batch.is_empty() {
            tokio::time::sleep(config.idle_poll_interval).await;
            continue;
        }

        dispatcher.run_batch(&queue, batch).await;
    }

    tracing::info!(queue = %queue, "poll loop stopped");
}
