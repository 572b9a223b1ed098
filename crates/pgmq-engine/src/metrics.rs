use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static MESSAGES_READ: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("messages_read_total", "Total messages claimed").unwrap());

pub static MESSAGES_ARCHIVED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("messages_archived_total", "Total messages archived").unwrap());

pub static HANDLER_FAILURES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("handler_failures_total", "Total handler failures").unwrap());

pub static MESSAGES_DEAD_LETTERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "messages_dead_lettered_total",
        "Total messages moved to a DLQ",
    )
    .unwrap()
});

pub static IN_FLIGHT_JOBS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("in_flight_jobs", "Handler invocations not yet resolved").unwrap());

pub fn init_metrics() {
    // Ignore errors if called multiple times (common in tests)
    let _ = REGISTRY.register(Box::new(MESSAGES_READ.clone()));
    let _ = REGISTRY.register(Box::new(MESSAGES_ARCHIVED.clone()));
    let _ = REGISTRY.register(Box::new(HANDLER_FAILURES.clone()));
    let _ = REGISTRY.register(Box::new(MESSAGES_DEAD_LETTERED.clone()));
    let _ = REGISTRY.register(Box::new(IN_FLIGHT_JOBS.clone()));
}

pub fn gather() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
