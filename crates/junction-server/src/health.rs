//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Names of the registered RPC methods, sorted.
    pub methods: Vec<String>,
}

/// Build a health response from the live connection count and the
/// registered method names.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    methods: Vec<String>,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        methods,
    }
}
