// Prometheus counters for the API surface

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref JOBS_ENQUEUED: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_jobs_enqueued_total", "Judge jobs pushed onto the queue"),
        &["mode"]
    )
    .expect("valid metric definition");
    pub static ref REQUESTS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_requests_rejected_total", "Requests refused before queueing"),
        &["reason"]
    )
    .expect("valid metric definition");
}

/// Attach the counters to the registry. Safe to call more than once.
pub fn register() {
    for collector in [JOBS_ENQUEUED.clone(), REQUESTS_REJECTED.clone()] {
        // AlreadyReg on repeat calls
        let _ = REGISTRY.register(Box::new(collector));
    }
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
