use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgmq_core::{EngineError, JobPayload, Message, MessageId, MessageStore};
use serde_json::Value;

#[derive(Clone)]
struct Stored {
    id: MessageId,
    read_count: i32,
    enqueued_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    payload: JobPayload,
    headers: Value,
}

#[derive(Default)]
struct QueueState {
    next_id: MessageId,
    messages: Vec<Stored>,
    archived: Vec<Stored>,
}

/// In-memory `MessageStore` with pgmq's read semantics: a read increments
/// `read_count` and pushes the visibility deadline forward.
#[derive(Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a message with a pre-existing read count, as if prior incarnations
    /// were claimed but never resolved.
    pub fn seed(&self, queue: &str, payload: JobPayload, headers: Value, read_count: i32) {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.entry(queue.to_string()).or_default();
        state.next_id += 1;
        let now = Utc::now();
        state.messages.push(Stored {
            id: state.next_id,
            read_count,
            enqueued_at: now,
            visible_at: now,
            payload,
            headers,
        });
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.queues.lock().unwrap().contains_key(queue)
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map_or(0, |s| s.messages.len())
    }

    pub fn archived_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map_or(0, |s| s.archived.len())
    }

    /// `(payload, headers)` of every active message, in id order.
    pub fn raw_messages(&self, queue: &str) -> Vec<(JobPayload, Value)> {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map_or(Vec::new(), |s| {
                s.messages
                    .iter()
                    .map(|m| (m.payload.clone(), m.headers.clone()))
                    .collect()
            })
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_queue_if_absent(&self, queue: &str) -> Result<(), EngineError> {
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn send_raw(
        &self,
        queue: &str,
        payload: &JobPayload,
        headers: &Value,
        delay_seconds: i32,
    ) -> Result<MessageId, EngineError> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| EngineError::Database(format!("queue '{queue}' does not exist")))?;
        state.next_id += 1;
        let now = Utc::now();
        state.messages.push(Stored {
            id: state.next_id,
            read_count: 0,
            enqueued_at: now,
            visible_at: now + Duration::from_secs(delay_seconds as u64),
            payload: payload.clone(),
            headers: headers.clone(),
        });
        Ok(state.next_id)
    }

    async fn read(
        &self,
        queue: &str,
        visibility_timeout_secs: i32,
        batch_size: i64,
    ) -> Result<Vec<Message>, EngineError> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| EngineError::Database(format!("queue '{queue}' does not exist")))?;

        let now = Utc::now();
        let mut batch = Vec::new();
        for stored in state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(batch_size as usize)
        {
            stored.read_count += 1;
            stored.visible_at = now + Duration::from_secs(visibility_timeout_secs as u64);
            batch.push(Message {
                id: stored.id,
                read_count: stored.read_count,
                enqueued_at: stored.enqueued_at,
                visible_at: stored.visible_at,
                payload: stored.payload.clone(),
                headers: serde_json::from_value(stored.headers.clone())?,
            });
        }
        Ok(batch)
    }

    async fn archive(&self, queue: &str, id: MessageId) -> Result<(), EngineError> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| EngineError::Database(format!("queue '{queue}' does not exist")))?;
        let pos = state
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| EngineError::Database(format!("message {id} not found")))?;
        let msg = state.messages.remove(pos);
        state.archived.push(msg);
        Ok(())
    }

    async fn delete(&self, queue: &str, id: MessageId) -> Result<(), EngineError> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| EngineError::Database(format!("queue '{queue}' does not exist")))?;
        let pos = state
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| EngineError::Database(format!("message {id} not found")))?;
        state.messages.remove(pos);
        Ok(())
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
