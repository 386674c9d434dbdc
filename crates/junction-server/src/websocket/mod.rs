//! Persistent WebSocket binding: connection state, hub registry, and the
//! per-connection read/write/stream tasks.

pub mod connection;
pub mod hub;
pub mod session;
