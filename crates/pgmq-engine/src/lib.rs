//! pgmq worker engine: handler registry, publisher, per-queue poll loops,
//! concurrent batch dispatch with a retry-then-dead-letter policy, and a
//! draining lifecycle controller.
//!
//! Delivery is at-least-once; handlers must tolerate redelivery. Retry
//! backoff is the store's visibility timeout, not an exponential schedule.

mod dispatch;
mod engine;
pub mod metrics;
mod poll;
mod publisher;
mod registry;

pub use engine::{EngineState, WorkerEngine};
pub use publisher::{AddOptions, Publisher};
pub use registry::{HandlerDescriptor, JobHandler, Registry};
