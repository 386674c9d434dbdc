//! # junction-rpc
//!
//! JSON-RPC 2.0 request-dispatch engine.
//!
//! - Wire envelopes (`Request`, `Response`) with polymorphic request ids
//! - Typed codec registration (`Codec`, `StreamCodec`) — one decode /
//!   handle / encode triple per method name
//! - Batch normalization (single object vs. array payloads)
//! - Synchronous and asynchronous batch dispatch with per-handler timeout
//! - `StreamSink` push channel for long-lived streaming methods
//!
//! Transport bindings (HTTP, WebSocket) live in `junction-server`; this
//! crate is transport-agnostic.

#![deny(unsafe_code)]

pub mod batch;
pub mod codec;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod stream;
pub mod types;

pub use batch::normalize;
pub use codec::{Codec, JsonCodec, StreamCodec};
pub use context::CallContext;
pub use dispatch::{DispatchMode, Dispatcher};
pub use error::RpcError;
pub use registry::{Registry, RegistryError};
pub use stream::{StreamClosed, StreamSink};
pub use types::{ErrorObject, Request, RequestId, Response, VERSION};
