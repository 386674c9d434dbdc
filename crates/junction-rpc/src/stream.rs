//! Long-lived push channel bound to one streaming method invocation.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::types::{RequestId, Response};

/// The owning connection has been torn down.
#[derive(Debug, thiserror::Error)]
#[error("stream closed")]
pub struct StreamClosed;

/// Handle given to a streaming method's decode function.
///
/// `write` packages a value as a `stream: true` response envelope reusing
/// the original call's id and enqueues it on the owning connection's
/// outbound path; it never completes the call. `recv` yields follow-up
/// data the client pushed to the already-open stream. Both end when the
/// connection is torn down.
#[derive(Clone)]
pub struct StreamSink {
    id: Option<RequestId>,
    outbound: mpsc::Sender<Response>,
    inbound: Arc<Mutex<mpsc::Receiver<Value>>>,
}

impl StreamSink {
    /// Build a sink bound to `id`, writing into `outbound`.
    ///
    /// Returns the sink together with the inbound producer the owning
    /// connection keeps for routing follow-up frames into the stream.
    pub fn channel(
        id: Option<RequestId>,
        outbound: mpsc::Sender<Response>,
        inbound_capacity: usize,
    ) -> (Self, mpsc::Sender<Value>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let sink = Self {
            id,
            outbound,
            inbound: Arc::new(Mutex::new(inbound_rx)),
        };
        (sink, inbound_tx)
    }

    /// The correlation id of the call that opened this stream.
    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// Push one value to the client as an independent response envelope.
    pub async fn write(&self, value: Value) -> Result<(), StreamClosed> {
        let response = Response::stream_item(self.id.clone(), value);
        self.outbound.send(response).await.map_err(|_| StreamClosed)
    }

    /// Receive the next value the client pushed into this stream.
    ///
    /// Returns `None` once the owning connection is gone.
    pub async fn recv(&self) -> Option<Value> {
        self.inbound.lock().await.recv().await
    }
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_produces_stream_item_with_call_id() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (sink, _inbound) = StreamSink::channel(Some(RequestId::Int(7)), out_tx, 4);

        sink.write(json!({"seq": 1})).await.unwrap();
        let resp = out_rx.recv().await.unwrap();
        assert!(resp.stream);
        assert_eq!(resp.id, Some(RequestId::Int(7)));
        assert_eq!(resp.result, Some(json!({"seq": 1})));
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn write_fails_after_connection_gone() {
        let (out_tx, out_rx) = mpsc::channel(1);
        let (sink, _inbound) = StreamSink::channel(None, out_tx, 1);
        drop(out_rx);
        assert!(sink.write(json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn recv_yields_pushed_data_in_order() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (sink, inbound) = StreamSink::channel(Some(RequestId::Int(1)), out_tx, 4);

        inbound.send(json!("a")).await.unwrap();
        inbound.send(json!("b")).await.unwrap();
        assert_eq!(sink.recv().await, Some(json!("a")));
        assert_eq!(sink.recv().await, Some(json!("b")));
    }

    #[tokio::test]
    async fn recv_ends_when_inbound_dropped() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (sink, inbound) = StreamSink::channel(None, out_tx, 1);
        drop(inbound);
        assert_eq!(sink.recv().await, None);
    }

    #[tokio::test]
    async fn sink_is_cloneable() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (sink, _inbound) = StreamSink::channel(Some(RequestId::Str("s".into())), out_tx, 1);
        let sink2 = sink.clone();
        sink2.write(json!(2)).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap().result, Some(json!(2)));
    }
}
