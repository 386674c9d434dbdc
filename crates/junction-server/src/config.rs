//! Server configuration: compiled defaults, optional JSON file overrides,
//! environment variables last.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse the config file as JSON.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for the junction server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path serving the HTTP request/response binding (default `/rpc`).
    pub rpc_path: String,
    /// Path serving the WebSocket upgrade (default `/ws`).
    pub ws_path: String,
    /// Maximum inbound WebSocket frame size in bytes (default 512).
    pub max_frame_size: usize,
    /// Capacity of each connection's outbound frame queue (default 256).
    pub outbound_capacity: usize,
    /// Per-connection worker bound for concurrent request execution
    /// (default 100).
    pub workers: usize,
    /// Capacity of per-stream inbound data queues (default 20).
    pub worker_queue: usize,
    /// Read deadline: a connection with no inbound frame (pongs included)
    /// for this long is torn down (default 60).
    pub pong_wait_secs: u64,
    /// Deadline for a single physical write (default 10).
    pub write_wait_secs: u64,
    /// Budget for a single handler invocation (default 60).
    pub handler_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            rpc_path: "/rpc".into(),
            ws_path: "/ws".into(),
            max_frame_size: 512,
            outbound_capacity: 256,
            workers: 100,
            worker_queue: 20,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            handler_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Read deadline as a [`Duration`].
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Keepalive probe interval: nine tenths of the read deadline, so a
    /// probe round-trip always fits inside it.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait().mul_f64(0.9)
    }

    /// Per-write deadline as a [`Duration`].
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Handler budget as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

/// Load configuration: defaults, deep-merged with `path` if it exists,
/// then environment variable overrides (highest priority).
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge: objects merge per-key, everything else is
/// replaced by the source, nulls in the source are skipped.
fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Invalid values are silently
/// ignored, falling back to file/default.
fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(v) = std::env::var("JUNCTION_HOST") {
        if !v.is_empty() {
            config.host = v;
        }
    }
    if let Some(v) = read_env_u64("JUNCTION_PORT", 0, 65535) {
        config.port = u16::try_from(v).unwrap_or(config.port);
    }
    if let Some(v) = read_env_u64("JUNCTION_WORKERS", 1, 10_000) {
        config.workers = usize::try_from(v).unwrap_or(config.workers);
    }
    if let Some(v) = read_env_u64("JUNCTION_MAX_FRAME_SIZE", 1, 64 * 1024 * 1024) {
        config.max_frame_size = usize::try_from(v).unwrap_or(config.max_frame_size);
    }
    if let Some(v) = read_env_u64("JUNCTION_PONG_WAIT_SECS", 1, 3600) {
        config.pong_wait_secs = v;
    }
    if let Some(v) = read_env_u64("JUNCTION_HANDLER_TIMEOUT_SECS", 1, 3600) {
        config.handler_timeout_secs = v;
    }
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    let parsed: u64 = raw.parse().ok()?;
    (min..=max).contains(&parsed).then_some(parsed)
}
