//! Static method-name → codec registration table.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::codec::{Codec, ErasedCodec, ErasedStreamCodec, StreamCodec, StreamEntry};
use crate::context::CallContext;
use crate::error::RpcError;
use crate::stream::StreamSink;

/// Registration failure.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The method name is already taken (by either table).
    #[error("method '{0}' is already registered")]
    Duplicate(String),
}

/// The codec map: unary and streaming codecs keyed by exact,
/// case-sensitive method name.
///
/// Built once at server construction — uniqueness is enforced across
/// both tables at registration time — and immutable afterwards (moved
/// into an `Arc` by the transports).
#[derive(Default)]
pub struct Registry {
    unary: HashMap<String, Arc<dyn ErasedCodec>>,
    streams: HashMap<String, Arc<dyn ErasedStreamCodec>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary codec for `method`.
    pub fn register(
        &mut self,
        method: &str,
        codec: impl Codec,
    ) -> Result<(), RegistryError> {
        self.check_free(method)?;
        let _ = self.unary.insert(method.to_owned(), Arc::new(codec));
        Ok(())
    }

    /// Register a streaming codec for `method`.
    pub fn register_stream(
        &mut self,
        method: &str,
        codec: impl StreamCodec,
    ) -> Result<(), RegistryError> {
        self.check_free(method)?;
        let _ = self
            .streams
            .insert(method.to_owned(), Arc::new(StreamEntry(Arc::new(codec))));
        Ok(())
    }

    fn check_free(&self, method: &str) -> Result<(), RegistryError> {
        if self.unary.contains_key(method) || self.streams.contains_key(method) {
            return Err(RegistryError::Duplicate(method.to_owned()));
        }
        Ok(())
    }

    /// Whether a unary codec is registered under `method`.
    pub fn has_unary(&self, method: &str) -> bool {
        self.unary.contains_key(method)
    }

    /// Whether a streaming codec is registered under `method`.
    pub fn has_stream(&self, method: &str) -> bool {
        self.streams.contains_key(method)
    }

    /// All registered method names (both tables), sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .unary
            .keys()
            .chain(self.streams.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.unary.len() + self.streams.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.unary.is_empty() && self.streams.is_empty()
    }

    pub(crate) fn get_unary(&self, method: &str) -> Option<&Arc<dyn ErasedCodec>> {
        self.unary.get(method)
    }

    /// Open a stream for `method`: run the stream decode with `sink` and
    /// return the long-lived handler future for the transport to spawn.
    ///
    /// `None` when the method is not registered as streaming; `Some(Err)`
    /// when decode fails.
    pub fn open_stream(
        &self,
        method: &str,
        ctx: CallContext,
        params: Option<Value>,
        sink: StreamSink,
    ) -> Option<Result<BoxFuture<'static, Result<(), RpcError>>, RpcError>> {
        self.streams
            .get(method)
            .map(|codec| codec.open(ctx, params, sink))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods())
            .finish()
    }
}
