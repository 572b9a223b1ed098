use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pgmq_core::{EngineConfig, EngineError, MessageStore};
use tokio::task::JoinHandle;

use crate::dispatch::Dispatcher;
use crate::poll;
use crate::registry::{HandlerDescriptor, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    Draining,
}

/// Owns the poll loops and the shutdown drain.
///
/// Lifecycle: `Stopped -> Running -> Draining -> Stopped`. The stop signal is
/// cooperative: loops observe it between iterations, never mid-batch, and
/// in-flight handlers are waited on with a bound rather than cancelled.
pub struct WorkerEngine {
    store: Arc<dyn MessageStore>,
    registry: Arc<Registry>,
    config: EngineConfig,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    state: EngineState,
    loops: Vec<JoinHandle<()>>,
}

impl WorkerEngine {
    /// Build the registry from the discovered descriptors. A duplicate
    /// `(queue, job)` registration fails here, before anything starts.
    pub fn new(
        store: Arc<dyn MessageStore>,
        descriptors: Vec<HandlerDescriptor>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let registry = Arc::new(Registry::build(descriptors)?);

        Ok(Self {
            store,
            registry,
            config,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            state: EngineState::Stopped,
            loops: Vec::new(),
        })
    }

    /// Handler invocations claimed but not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Ensure every registry queue exists, then spawn one poll loop per queue.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Running {
            return Ok(());
        }

        for queue in self.registry.queues() {
            self.store.create_queue_if_absent(queue).await?;
        }

        self.running.store(true, Ordering::SeqCst);

        let dispatcher = Dispatcher::new(
            self.store.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.in_flight.clone(),
        );

        for queue in self.registry.queues() {
            self.loops.push(tokio::spawn(poll::poll_queue(
                queue.to_string(),
                self.store.clone(),
                dispatcher.clone(),
                self.config.clone(),
                self.running.clone(),
            )));
        }

        self.state = EngineState::Running;
        tracing::info!(queues = self.loops.len(), "worker engine started");
        Ok(())
    }

    /// Stop loop iteration and drain: wait for in-flight jobs up to
    /// `max_drain_attempts * drain_poll_interval`, then proceed regardless.
    /// A zero in-flight count completes without sleeping.
    pub async fn shutdown(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        self.state = EngineState::Draining;
        tracing::info!("stopping worker engine...");

        let mut attempts = 0;
        while self.in_flight() > 0 && attempts < self.config.max_drain_attempts {
            tracing::debug!(
                in_flight = self.in_flight(),
                attempt = attempts + 1,
                "waiting for in-flight jobs to finish"
            );
            tokio::time::sleep(self.config.drain_poll_interval).await;
            attempts += 1;
        }

        let remaining = self.in_flight();
        if remaining > 0 {
            // In-flight handlers are never cancelled: dropping the handles
            // detaches the loops, which finish their current batch in the
            // background and then exit on the cleared running flag. Stuck
            // messages redeliver after visibility expiry.
            tracing::warn!(in_flight = remaining, "forced shutdown with jobs still processing");
            self.loops.clear();
        } else {
            for handle in self.loops.drain(..) {
                let _ = handle.await;
            }
            tracing::info!("worker engine stopped gracefully");
        }

        self.state = EngineState::Stopped;
    }
}
