mod config;
mod error;
mod message;
mod store;

pub use config::EngineConfig;
pub use error::EngineError;
pub use message::{DeadLetterHeaders, JobPayload, Message, MessageHeaders, MessageId};
pub use store::MessageStore;
