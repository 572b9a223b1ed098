use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pgmq_core::{EngineError, Message};

/// A registered job handler. Any returned error counts as a failed attempt.
pub type JobHandler =
    Arc<dyn Fn(Message) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// One discovered `(queue, job) -> handler` binding, collected before the
/// engine starts. How descriptors are produced (explicit calls, builders,
/// scanning) is the embedding host's business.
pub struct HandlerDescriptor {
    pub queue: String,
    pub job: String,
    pub handler: JobHandler,
}

impl HandlerDescriptor {
    pub fn new<F, Fut>(queue: impl Into<String>, job: impl Into<String>, f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            queue: queue.into(),
            job: job.into(),
            handler: Arc::new(move |msg| Box::pin(f(msg))),
        }
    }
}

/// Immutable queue -> job -> handler mapping, built once at startup and shared
/// read-only by every poll loop.
pub struct Registry {
    handlers: HashMap<String, HashMap<String, JobHandler>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("queues", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Build the registry. A second handler for the same `(queue, job)` pair
    /// is a fatal configuration error; the process must not start with an
    /// ambiguous mapping.
    pub fn build(descriptors: Vec<HandlerDescriptor>) -> Result<Self, EngineError> {
        let mut handlers: HashMap<String, HashMap<String, JobHandler>> = HashMap::new();

        for desc in descriptors {
            let queue_handlers = handlers.entry(desc.queue.clone()).or_default();
            if queue_handlers.contains_key(&desc.job) {
                return Err(EngineError::DuplicateHandler {
                    queue: desc.queue,
                    job: desc.job,
                });
            }
            queue_handlers.insert(desc.job, desc.handler);
        }

        for (queue, jobs) in &handlers {
            let mut names: Vec<&str> = jobs.keys().map(String::as_str).collect();
            names.sort_unstable();
            tracing::info!(queue = %queue, jobs = ?names, "mapped job handlers");
        }

        Ok(Self { handlers })
    }

    /// Pure lookup. Absence is not an error: the dispatcher logs and skips,
    /// leaving the message for redelivery.
    pub fn resolve(&self, queue: &str, job: &str) -> Option<&JobHandler> {
        self.handlers.get(queue)?.get(job)
    }

    /// Distinct queue names with at least one handler; one poll loop each.
    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
