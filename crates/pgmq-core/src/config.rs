use std::time::Duration;

/// Engine-wide tuning knobs. Fixed per engine instance, not per message.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a read hides a message from other readers.
    pub visibility_timeout_secs: i32,
    /// Max messages claimed per poll iteration.
    pub batch_size: i64,
    /// Sleep between polls of an empty queue; busy queues poll back-to-back.
    pub idle_poll_interval: Duration,
    /// Read count at which a failed message is escalated to the DLQ.
    pub max_retries: i32,
    /// How often shutdown re-checks the in-flight counter while draining.
    pub drain_poll_interval: Duration,
    /// Drain checks before shutdown proceeds with jobs still in flight.
    pub max_drain_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 30,
            batch_size: 10,
            idle_poll_interval: Duration::from_secs(1),
            max_retries: 5,
            drain_poll_interval: Duration::from_millis(500),
            max_drain_attempts: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            visibility_timeout_secs: env_parse(
                "VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout_secs,
            ),
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size),
            idle_poll_interval: Duration::from_millis(env_parse(
                "IDLE_POLL_INTERVAL_MS",
                defaults.idle_poll_interval.as_millis() as u64,
            )),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            drain_poll_interval: Duration::from_millis(env_parse(
                "DRAIN_POLL_INTERVAL_MS",
                defaults.drain_poll_interval.as_millis() as u64,
            )),
            max_drain_attempts: env_parse("MAX_DRAIN_ATTEMPTS", defaults.max_drain_attempts),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
