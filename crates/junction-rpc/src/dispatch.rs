//! Dispatch core: execute request lists against the codec map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::RpcError;
use crate::registry::Registry;
use crate::types::{Request, Response};

/// Default budget for a single handler invocation.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Handler runtime above which a slow-call warning is logged.
const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(5);

/// How a batch is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Requests run one after another; response order matches input order
    /// and the whole batch completes before anything is returned.
    Sync,
    /// Every request is spawned as an independent task; responses are
    /// collected in completion order — only the echoed id ties a response
    /// to its request.
    Async,
}

/// Executes requests against a [`Registry`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    handler_timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher over `registry` with the default handler timeout.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the per-handler timeout.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// The registry this dispatcher resolves methods in.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Execute one request, producing exactly one response that carries
    /// the request's id.
    pub async fn dispatch_one(&self, ctx: &CallContext, request: Request) -> Response {
        run_one(&self.registry, self.handler_timeout, ctx, request).await
    }

    /// Execute a batch in the given mode, collecting one response per
    /// request.
    pub async fn dispatch_batch(
        &self,
        ctx: &CallContext,
        requests: Vec<Request>,
        mode: DispatchMode,
    ) -> Vec<Response> {
        match mode {
            DispatchMode::Sync => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in requests {
                    responses.push(self.dispatch_one(ctx, request).await);
                }
                responses
            }
            DispatchMode::Async => {
                let mut tasks = JoinSet::new();
                // request ids keyed by task id, so a crashed task still
                // answers with the id it was dispatched for
                let mut ids = HashMap::new();
                let count = requests.len();
                for request in requests {
                    let registry = Arc::clone(&self.registry);
                    let timeout = self.handler_timeout;
                    let ctx = ctx.clone();
                    let request_id = request.id.clone();
                    let handle = tasks
                        .spawn(async move { run_one(&registry, timeout, &ctx, request).await });
                    let _ = ids.insert(handle.id(), request_id);
                }
                let mut responses = Vec::with_capacity(count);
                while let Some(joined) = tasks.join_next_with_id().await {
                    responses.push(match joined {
                        Ok((_task_id, response)) => response,
                        Err(e) => {
                            warn!(error = %e, "dispatch task failed");
                            let id = ids.remove(&e.id()).flatten();
                            Response::from_error(id, &RpcError::internal("dispatch task failed"))
                        }
                    });
                }
                responses
            }
        }
    }
}

/// Resolve and run a single request against the unary table.
async fn run_one(
    registry: &Registry,
    handler_timeout: Duration,
    ctx: &CallContext,
    request: Request,
) -> Response {
    let method = request.method;
    let id = request.id;

    if method.is_empty() {
        return Response::from_error(
            id,
            &RpcError::InvalidRequest {
                message: "request has no method".into(),
            },
        );
    }

    let Some(codec) = registry.get_unary(&method) else {
        return Response::from_error(id, &RpcError::method_not_found(&method));
    };

    debug!(method, id = id.as_ref().map(ToString::to_string), "dispatching");
    let call_ctx = ctx.for_request(id.clone());
    let start = std::time::Instant::now();

    let response = match tokio::time::timeout(
        handler_timeout,
        codec.call(&call_ctx, request.params),
    )
    .await
    {
        Ok(Ok(result)) => Response::success(id, result),
        Ok(Err(err)) => Response::from_error(id, &err),
        Err(_elapsed) => {
            warn!(method, timeout_secs = handler_timeout.as_secs(), "handler timed out");
            Response::from_error(
                id,
                &RpcError::internal(format!("Handler for '{method}' timed out")),
            )
        }
    };

    let elapsed = start.elapsed();
    if elapsed >= SLOW_CALL_THRESHOLD {
        warn!(method, duration_secs = elapsed.as_secs_f64(), "slow call");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::error;
    use crate::types::RequestId;
    use serde_json::{Value, json};
    use std::collections::HashSet;

    fn registry() -> Arc<Registry> {
        let mut reg = Registry::new();
        reg.register(
            "add",
            JsonCodec::new(|(a, b): (i64, i64)| async move { Ok(a + b) }),
        )
        .unwrap();
        reg.register(
            "fail",
            JsonCodec::new(|(): ()| async move {
                Err::<Value, _>(RpcError::internal("boom"))
            }),
        )
        .unwrap();
        reg.register(
            "crash",
            JsonCodec::new(|(): ()| async move {
                let crash = true;
                assert!(!crash, "handler crashed");
                Ok(json!(null))
            }),
        )
        .unwrap();
        reg.register(
            "slow",
            JsonCodec::new(|(): ()| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!(null))
            }),
        )
        .unwrap();
        Arc::new(reg)
    }

    fn request(method: &str, params: Value, id: i64) -> Request {
        Request::new(method, Some(params), Some(RequestId::Int(id)))
    }

    #[tokio::test]
    async fn add_returns_sum_with_same_id() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(&CallContext::default(), request("add", json!([3, 2]), 1))
            .await;
        assert_eq!(resp.result, Some(json!(5)));
        assert_eq!(resp.id, Some(RequestId::Int(1)));
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(&CallContext::default(), request("missing", json!(null), 2))
            .await;
        assert_eq!(resp.error.as_ref().unwrap().code, error::METHOD_NOT_FOUND);
        assert_eq!(resp.id, Some(RequestId::Int(2)));
    }

    #[tokio::test]
    async fn empty_method_is_invalid_request() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(&CallContext::default(), request("", json!(null), 3))
            .await;
        assert_eq!(resp.error.as_ref().unwrap().code, error::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn decode_failure_is_invalid_params() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(&CallContext::default(), request("add", json!("x"), 4))
            .await;
        assert_eq!(resp.error.as_ref().unwrap().code, error::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn handler_failure_is_internal_error() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(&CallContext::default(), request("fail", json!(null), 5))
            .await;
        assert_eq!(resp.error.as_ref().unwrap().code, error::INTERNAL_ERROR);
        assert_eq!(resp.error.as_ref().unwrap().message, "boom");
    }

    #[tokio::test]
    async fn notification_still_answered_with_null_id() {
        let d = Dispatcher::new(registry());
        let resp = d
            .dispatch_one(
                &CallContext::default(),
                Request::new("add", Some(json!([1, 1])), None),
            )
            .await;
        assert_eq!(resp.result, Some(json!(2)));
        assert!(resp.id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_timeout_produces_internal_error() {
        let d = Dispatcher::new(registry()).with_handler_timeout(Duration::from_millis(50));
        let resp = d
            .dispatch_one(&CallContext::default(), request("slow", json!(null), 6))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, error::INTERNAL_ERROR);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn sync_batch_preserves_input_order() {
        let d = Dispatcher::new(registry());
        let batch = vec![
            request("add", json!([1, 1]), 1),
            request("add", json!([2, 2]), 2),
            request("add", json!([3, 3]), 3),
        ];
        let responses = d
            .dispatch_batch(&CallContext::default(), batch, DispatchMode::Sync)
            .await;
        let ids: Vec<_> = responses.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                Some(RequestId::Int(1)),
                Some(RequestId::Int(2)),
                Some(RequestId::Int(3))
            ]
        );
        assert_eq!(responses[2].result, Some(json!(6)));
    }

    #[tokio::test]
    async fn async_batch_answers_every_request_exactly_once() {
        let d = Dispatcher::new(registry());
        let batch: Vec<Request> = (0..20)
            .map(|i| request("add", json!([i, 1]), i))
            .collect();
        let responses = d
            .dispatch_batch(&CallContext::default(), batch, DispatchMode::Async)
            .await;
        assert_eq!(responses.len(), 20);
        let ids: HashSet<i64> = responses
            .iter()
            .map(|r| r.id.as_ref().unwrap().as_int().unwrap())
            .collect();
        assert_eq!(ids.len(), 20);
        for resp in &responses {
            let id = resp.id.as_ref().unwrap().as_int().unwrap();
            assert_eq!(resp.result, Some(json!(id + 1)));
        }
    }

    #[tokio::test]
    async fn panicking_handler_in_async_batch_echoes_its_id() {
        let d = Dispatcher::new(registry());
        let batch = vec![
            request("crash", json!(null), 7),
            request("add", json!([1, 1]), 8),
        ];
        let responses = d
            .dispatch_batch(&CallContext::default(), batch, DispatchMode::Async)
            .await;
        assert_eq!(responses.len(), 2);

        let by_id = |id: i64| {
            responses
                .iter()
                .find(|r| r.id == Some(RequestId::Int(id)))
                .unwrap()
        };
        assert_eq!(by_id(7).error.as_ref().unwrap().code, error::INTERNAL_ERROR);
        assert_eq!(by_id(8).result, Some(json!(2)));
    }

    #[tokio::test]
    async fn sibling_failures_do_not_abort_batch() {
        let d = Dispatcher::new(registry());
        let batch = vec![
            request("add", json!([1, 1]), 1),
            request("missing", json!(null), 2),
        ];
        let responses = d
            .dispatch_batch(&CallContext::default(), batch, DispatchMode::Sync)
            .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].result, Some(json!(2)));
        assert_eq!(
            responses[1].error.as_ref().unwrap().code,
            error::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn empty_batch_yields_no_responses() {
        let d = Dispatcher::new(registry());
        let responses = d
            .dispatch_batch(&CallContext::default(), vec![], DispatchMode::Async)
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn streaming_method_is_not_visible_to_unary_dispatch() {
        use crate::codec::StreamCodec;
        use crate::stream::StreamSink;
        use async_trait::async_trait;

        struct Feed;

        #[async_trait]
        impl StreamCodec for Feed {
            type Request = ();

            fn decode(
                &self,
                _ctx: &CallContext,
                _params: Option<&Value>,
                _stream: StreamSink,
            ) -> Result<(), RpcError> {
                Ok(())
            }

            async fn handle(&self, _ctx: &CallContext, (): ()) -> Result<(), RpcError> {
                Ok(())
            }
        }

        let mut reg = Registry::new();
        reg.register_stream("feed", Feed).unwrap();
        let d = Dispatcher::new(Arc::new(reg));
        let resp = d
            .dispatch_one(&CallContext::default(), request("feed", json!(null), 1))
            .await;
        assert_eq!(resp.error.as_ref().unwrap().code, error::METHOD_NOT_FOUND);
    }
}
