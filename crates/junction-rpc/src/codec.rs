//! Codec traits: the decode / handle / encode triple bound to one method.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::CallContext;
use crate::error::RpcError;
use crate::stream::StreamSink;

/// A unary (one-shot) method: decode params, invoke, encode the result.
///
/// Registered once per method name at server construction and treated as
/// opaque by the engine. Decode failures default to `InvalidParams`,
/// handler failures to `InternalError`; any stage may return
/// [`RpcError::Custom`] to surface an application code.
#[async_trait]
pub trait Codec: Send + Sync + 'static {
    /// Decoded domain request.
    type Request: Send;
    /// Domain response produced by the handler.
    type Response: Send;

    /// Decode the raw `params` value into a domain request.
    fn decode(&self, ctx: &CallContext, params: Option<&Value>)
    -> Result<Self::Request, RpcError>;

    /// Execute the call.
    async fn handle(
        &self,
        ctx: &CallContext,
        request: Self::Request,
    ) -> Result<Self::Response, RpcError>;

    /// Encode the domain response into the envelope's `result` value.
    fn encode(&self, ctx: &CallContext, response: Self::Response) -> Result<Value, RpcError>;
}

/// A streaming method: decode receives the [`StreamSink`] the handler
/// will write to, and the handler runs long-lived (typically until the
/// owning connection is torn down).
#[async_trait]
pub trait StreamCodec: Send + Sync + 'static {
    /// Decoded domain request; usually captures the sink.
    type Request: Send + 'static;

    /// Decode the raw `params`, binding the stream handle.
    fn decode(
        &self,
        ctx: &CallContext,
        params: Option<&Value>,
        stream: StreamSink,
    ) -> Result<Self::Request, RpcError>;

    /// Run the stream until completion or connection teardown.
    async fn handle(&self, ctx: &CallContext, request: Self::Request) -> Result<(), RpcError>;
}

/// Object-safe form of [`Codec`] stored in the registry.
#[async_trait]
pub(crate) trait ErasedCodec: Send + Sync {
    /// Run decode → handle → encode for one request.
    async fn call(&self, ctx: &CallContext, params: Option<Value>) -> Result<Value, RpcError>;
}

#[async_trait]
impl<C: Codec> ErasedCodec for C {
    async fn call(&self, ctx: &CallContext, params: Option<Value>) -> Result<Value, RpcError> {
        let request = self.decode(ctx, params.as_ref())?;
        let response = self.handle(ctx, request).await?;
        self.encode(ctx, response)
    }
}

/// Object-safe form of [`StreamCodec`]: decodes eagerly and returns the
/// long-lived handler future for the transport to spawn.
pub(crate) trait ErasedStreamCodec: Send + Sync {
    fn open(
        &self,
        ctx: CallContext,
        params: Option<Value>,
        stream: StreamSink,
    ) -> Result<BoxFuture<'static, Result<(), RpcError>>, RpcError>;
}

pub(crate) struct StreamEntry<S>(pub(crate) Arc<S>);

impl<S: StreamCodec> ErasedStreamCodec for StreamEntry<S> {
    fn open(
        &self,
        ctx: CallContext,
        params: Option<Value>,
        stream: StreamSink,
    ) -> Result<BoxFuture<'static, Result<(), RpcError>>, RpcError> {
        let request = self.0.decode(&ctx, params.as_ref(), stream)?;
        let codec = Arc::clone(&self.0);
        Ok(async move { codec.handle(&ctx, request).await }.boxed())
    }
}

/// [`Codec`] built from a plain async function, with decode and encode
/// derived from serde.
///
/// Absent `params` decode as JSON `null`, so optional-parameter methods
/// can take an `Option<T>` request type.
pub struct JsonCodec<Req, Resp, F> {
    handler: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F, Fut> JsonCodec<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, RpcError>> + Send,
{
    /// Wrap `handler` as a full codec.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> Codec for JsonCodec<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, RpcError>> + Send,
{
    type Request = Req;
    type Response = Resp;

    fn decode(&self, _ctx: &CallContext, params: Option<&Value>) -> Result<Req, RpcError> {
        let value = params.cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| RpcError::invalid_params(format!("invalid params: {e}")))
    }

    async fn handle(&self, _ctx: &CallContext, request: Req) -> Result<Resp, RpcError> {
        (self.handler)(request).await
    }

    fn encode(&self, _ctx: &CallContext, response: Resp) -> Result<Value, RpcError> {
        serde_json::to_value(response)
            .map_err(|e| RpcError::internal(format!("failed to encode result: {e}")))
    }
}
