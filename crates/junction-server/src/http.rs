//! HTTP request/response binding — one `POST` per exchange.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response as HttpResponse};
use junction_rpc::{CallContext, DispatchMode, Response, normalize};
use tracing::debug;

use crate::server::AppState;

/// Header selecting asynchronous batch execution.
pub const ASYNC_HEADER: &str = "x-async";

/// `POST {rpc_path}` handler: body → batch normalizer → dispatch core →
/// JSON body.
///
/// The HTTP status is 200 even when the payload carries a JSON-RPC error
/// — protocol errors are data, not transport faults. Only pre-dispatch
/// transport rejections (wrong verb, failed body read) surface as HTTP
/// failures, and those are produced by the routing layer before this
/// handler runs.
pub async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let mode = dispatch_mode(&headers);
    let (requests, is_batch) = match normalize(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "rejecting unparseable body");
            return Json(Response::from_error(None, &err)).into_response();
        }
    };

    let ctx = CallContext::new(state.shutdown.child_token());
    let responses = state.dispatcher.dispatch_batch(&ctx, requests, mode).await;

    if is_batch {
        // an empty batch answers with an empty array
        Json(responses).into_response()
    } else {
        // single payloads normalize to exactly one request
        match responses.into_iter().next() {
            Some(response) => Json(response).into_response(),
            None => Json(serde_json::Value::Null).into_response(),
        }
    }
}

/// The async toggle lives outside the envelope: `X-Async: on|true|1`
/// selects completion-order dispatch, anything else keeps the ordered
/// default.
fn dispatch_mode(headers: &HeaderMap) -> DispatchMode {
    let enabled = headers
        .get(ASYNC_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value.eq_ignore_ascii_case("on")
                || value.eq_ignore_ascii_case("true")
                || value == "1"
        });
    if enabled {
        DispatchMode::Async
    } else {
        DispatchMode::Sync
    }
}
