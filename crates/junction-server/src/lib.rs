//! # junction-server
//!
//! Axum transport bindings for the `junction-rpc` dispatch engine.
//!
//! - HTTP binding: batch-capable single-shot JSON-RPC over `POST`, with a
//!   per-request asynchronous execution toggle (`X-Async` header)
//! - WebSocket binding: persistent bidirectional connections with a
//!   keepalive discipline, bounded per-connection worker stage, outbound
//!   write coalescing, and server-initiated streaming pushes
//! - Connection hub: single-coordinator registry of live connections
//! - `/health` endpoint reporting uptime and hub membership
//! - Graceful shutdown via `CancellationToken` fan-out

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod http;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ConfigError, ServerConfig, load_config};
pub use server::{AppState, JunctionServer};
pub use shutdown::ShutdownCoordinator;
