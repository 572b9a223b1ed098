use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// pgmq message id (`msg_id bigint`), assigned by the store on send.
pub type MessageId = i64;

/// The envelope written to the queue: which handler to run, and its input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_name: String,
    pub data: Value,
}

/// Tracing headers attached to every published message.
///
/// The required keys are generated by the publisher; callers may override any
/// of them and may attach arbitrary extension keys (kept in `extra`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeaders {
    pub message_id: String,
    pub correlation_id: String,
    pub producer_id: String,
    pub app_version: String,
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageHeaders {
    /// Apply caller-supplied header overrides. Overrides win over generated
    /// values, including for the required keys.
    pub fn apply_overrides(&mut self, overrides: Map<String, Value>) {
        for (key, value) in overrides {
            match key.as_str() {
                "messageId" => self.message_id = string_or_json(&value),
                "correlationId" => self.correlation_id = string_or_json(&value),
                "producerId" => self.producer_id = string_or_json(&value),
                "appVersion" => self.app_version = string_or_json(&value),
                "createdAt" => self.created_at = string_or_json(&value),
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
    }
}

fn string_or_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One message read from a queue, with pgmq's delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Times this message has been read without being archived or deleted,
    /// including the current read. Drives the retry/DLQ policy.
    pub read_count: i32,
    pub enqueued_at: DateTime<Utc>,
    /// End of the current visibility window; the store redelivers after this.
    pub visible_at: DateTime<Utc>,
    pub payload: JobPayload,
    pub headers: MessageHeaders,
}

/// Headers written to a dead-letter queue: the original message headers plus
/// failure diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterHeaders {
    #[serde(flatten)]
    pub original: MessageHeaders,
    pub error_type: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub failed_at: String,
    pub retry_count: i32,
    pub original_queue: String,
}
