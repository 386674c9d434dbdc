//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.
//!
//! A session is four cooperating tasks tied together by the connection's
//! cancellation token: the read loop (this function), a bounded routing
//! pool for inbound frames, the stream funnel, and the write loop. The
//! read loop enforces the inactivity deadline; the write loop owns the
//! socket sink, coalesces queued frames, and sends keepalive probes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use junction_rpc::{CallContext, Request, Response, RpcError, StreamSink, normalize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::connection::Connection;
use crate::config::ServerConfig;
use crate::server::AppState;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub
/// 2. Routes inbound frames through a bounded worker pool
/// 3. Forwards responses and stream writes via the outbound queue
/// 4. Sends periodic Ping frames and tears down idle connections
/// 5. Deregisters and cancels everything on disconnect
#[instrument(skip_all, fields(connection_id))]
pub async fn run_session(ws: WebSocket, state: Arc<AppState>) {
    let connection_id = format!("conn_{}", Uuid::now_v7().simple());
    let _ = tracing::Span::current().record("connection_id", connection_id.as_str());

    let (ws_tx, mut ws_rx) = ws.split();

    let cancel = state.shutdown.child_token();
    let (out_tx, out_rx) = mpsc::channel::<Arc<String>>(state.config.outbound_capacity);
    let (stream_tx, stream_rx) = mpsc::channel::<Response>(state.config.outbound_capacity);
    let connection = Arc::new(Connection::new(
        connection_id.clone(),
        out_tx,
        stream_tx,
        cancel.clone(),
    ));

    info!("client connected");
    state.hub.register(connection.clone()).await;

    let writer = tokio::spawn(write_loop(
        ws_tx,
        out_rx,
        cancel.clone(),
        state.config.clone(),
    ));
    let funnel = tokio::spawn(stream_funnel(
        stream_rx,
        connection.clone(),
        cancel.clone(),
    ));

    // Bounded routing pool: frames enter in arrival order, at most
    // `workers` execute at once, and a full queue backpressures the
    // read loop instead of spawning without limit.
    let (jobs_tx, jobs_rx) = mpsc::channel::<Vec<u8>>(state.config.workers * state.config.worker_queue);
    let router = {
        let state = state.clone();
        let connection = connection.clone();
        let workers = state.config.workers;
        tokio::spawn(async move {
            ReceiverStream::new(jobs_rx)
                .for_each_concurrent(workers, |payload| {
                    let state = state.clone();
                    let connection = connection.clone();
                    async move { route_frame(&state, &connection, &payload).await }
                })
                .await;
        })
    };

    let pong_wait = state.config.pong_wait();
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = timeout(pong_wait, ws_rx.next()) => frame,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(_elapsed) => {
                warn!(deadline_secs = pong_wait.as_secs(), "read deadline expired");
                break;
            }
        };
        let payload = match frame {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            // Any traffic resets the deadline; axum answers Pings itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "read error");
                break;
            }
            None => break,
        };
        if jobs_tx.send(payload).await.is_err() {
            break;
        }
    }

    info!("client disconnected");
    connection.shutdown();
    state.hub.unregister(&connection_id).await;
    drop(jobs_tx);
    let _ = router.await;
    let _ = funnel.await;
    let _ = writer.await;
}

/// Owns the socket sink: drains the outbound queue (coalescing whatever
/// is already buffered into one newline-separated write), sends Ping
/// probes every `ping_period`, and closes on cancellation. Every
/// physical write gets the per-write deadline.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Arc<String>>,
    cancel: CancellationToken,
    config: ServerConfig,
) {
    let write_wait = config.write_wait();
    let mut ping = tokio::time::interval(config.ping_period());
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = timeout(write_wait, ws_tx.send(Message::Close(None))).await;
                break;
            }
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                let mut payload = (*frame).clone();
                while let Ok(next) = out_rx.try_recv() {
                    payload.push('\n');
                    payload.push_str(&next);
                }
                match timeout(write_wait, ws_tx.send(Message::Text(payload.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "write failed");
                        break;
                    }
                    Err(_elapsed) => {
                        warn!(deadline_secs = write_wait.as_secs(), "write deadline expired");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                match timeout(write_wait, ws_tx.send(Message::Ping(vec![].into()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

/// Serializes stream-write responses onto the connection's outbound
/// queue. One funnel per connection keeps every stream handler off the
/// socket sink.
async fn stream_funnel(
    mut stream_rx: mpsc::Receiver<Response>,
    connection: Arc<Connection>,
    cancel: CancellationToken,
) {
    loop {
        let response = tokio::select! {
            () = cancel.cancelled() => break,
            response = stream_rx.recv() => response,
        };
        let Some(response) = response else { break };
        match serde_json::to_string(&response) {
            Ok(json) => {
                if !connection.send(Arc::new(json)).await {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize stream response");
            }
        }
    }
}

/// Normalize one inbound frame and answer it.
///
/// A single request yields a single response object; a batch yields an
/// array (unless every element was stream data, which produces nothing).
/// A payload that fails to parse yields one parse-error response with a
/// null id.
async fn route_frame(state: &AppState, connection: &Arc<Connection>, payload: &[u8]) {
    let (requests, is_batch) = match normalize(payload) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("invalid JSON received");
            send_response(connection, &Response::from_error(None, &err)).await;
            return;
        }
    };

    let ctx = CallContext::new(connection.cancel_token().child_token());
    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        if let Some(response) = route_request(state, connection, &ctx, request).await {
            responses.push(response);
        }
    }

    if is_batch {
        if responses.is_empty() {
            return;
        }
        match serde_json::to_string(&responses) {
            Ok(json) => {
                let _ = connection.send(Arc::new(json)).await;
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize batch response"),
        }
    } else if let Some(response) = responses.pop() {
        send_response(connection, &response).await;
    }
}

/// Route a single request envelope in precedence order: data for an
/// already-open stream, then unary dispatch, then stream open, then
/// method-not-found. Stream data consumes the envelope without a
/// response; a stream open acks directly on the connection (always an
/// independent frame, even mid-batch); everything else answers once
/// through the returned response.
async fn route_request(
    state: &AppState,
    connection: &Arc<Connection>,
    ctx: &CallContext,
    request: Request,
) -> Option<Response> {
    let method = request.method.clone();

    if !method.is_empty() {
        if let Some(input) = connection.stream_input(&method) {
            let data = request.params.unwrap_or(Value::Null);
            if input.send(data).await.is_err() {
                debug!(method, "stream input closed, dropping frame");
            }
            return None;
        }
    }

    let registry = state.dispatcher.registry();
    if method.is_empty() || registry.has_unary(&method) || !registry.has_stream(&method) {
        // covers unary, empty-method, and method-not-found responses
        return Some(state.dispatcher.dispatch_one(ctx, request).await);
    }

    let id = request.id;
    let (sink, input) = StreamSink::channel(
        id.clone(),
        connection.stream_sender(),
        state.config.worker_queue,
    );
    let call_ctx = ctx.for_request(id.clone());
    match registry.open_stream(&method, call_ctx, request.params, sink) {
        Some(Ok(handler)) => {
            if !connection.insert_stream(&method, input) {
                // lost the open race with a concurrent frame
                return Some(Response::from_error(
                    id,
                    &RpcError::InvalidRequest {
                        message: format!("stream for '{method}' is already open"),
                    },
                ));
            }
            // ack goes out before the handler can produce its first
            // write, so the caller always learns the call is long-lived
            // before any item arrives
            send_response(connection, &Response::stream_ack(id)).await;
            let cancel = connection.cancel_token().clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!(method, "stream handler cancelled");
                    }
                    result = handler => {
                        if let Err(err) = result {
                            warn!(method, error = %err, "stream handler failed");
                        } else {
                            debug!(method, "stream handler finished");
                        }
                    }
                }
            });
            None
        }
        Some(Err(err)) => Some(Response::from_error(id, &err)),
        None => Some(Response::from_error(id, &RpcError::method_not_found(&method))),
    }
}

async fn send_response(connection: &Arc<Connection>, response: &Response) {
    match serde_json::to_string(response) {
        Ok(json) => {
            if !connection.send(Arc::new(json)).await {
                debug!("failed to enqueue response (connection closing)");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize response"),
    }
}
