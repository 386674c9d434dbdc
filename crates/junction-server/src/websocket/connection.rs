//! Per-connection state shared between the read, write, and stream tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use junction_rpc::Response;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One physical duplex channel.
///
/// Owns the outbound frame queue (bounded), the funnel for stream-write
/// responses, and the registry of open stream inputs. Streams are keyed
/// by method name, shared across all calls from this connection — a
/// later inbound frame naming the same method is data for the open
/// stream, not a new call.
pub struct Connection {
    /// Unique connection id.
    pub id: String,
    outbound: mpsc::Sender<Arc<String>>,
    stream_tx: mpsc::Sender<Response>,
    streams: Mutex<HashMap<String, mpsc::Sender<Value>>>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
}

impl Connection {
    /// Create connection state around its channels.
    pub fn new(
        id: String,
        outbound: mpsc::Sender<Arc<String>>,
        stream_tx: mpsc::Sender<Response>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            outbound,
            stream_tx,
            streams: Mutex::new(HashMap::new()),
            cancel,
            connected_at: Instant::now(),
        }
    }

    /// Enqueue a serialized frame for the write loop.
    ///
    /// Blocks while the outbound queue is full; returns `false` once the
    /// write loop is gone.
    pub async fn send(&self, frame: Arc<String>) -> bool {
        self.outbound.send(frame).await.is_ok()
    }

    /// Sender for stream-write responses, handed to [`StreamSink`]s
    /// opened on this connection.
    ///
    /// [`StreamSink`]: junction_rpc::StreamSink
    pub fn stream_sender(&self) -> mpsc::Sender<Response> {
        self.stream_tx.clone()
    }

    /// Register an open stream's inbound producer under `method`.
    ///
    /// Returns `false` without inserting when a stream for this method is
    /// already open.
    pub fn insert_stream(&self, method: &str, input: mpsc::Sender<Value>) -> bool {
        let mut streams = self.streams.lock();
        if streams.contains_key(method) {
            return false;
        }
        let _ = streams.insert(method.to_owned(), input);
        true
    }

    /// Inbound producer for an open stream, if one exists for `method`.
    pub fn stream_input(&self, method: &str) -> Option<mpsc::Sender<Value>> {
        self.streams.lock().get(method).cloned()
    }

    /// Whether a stream is open for `method`.
    pub fn has_stream(&self, method: &str) -> bool {
        self.streams.lock().contains_key(method)
    }

    /// Tear the connection down: cancels the read/write loops and every
    /// stream handler bound to this connection, and drops all stream
    /// inputs so handlers reading follow-up data observe end-of-stream.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.streams.lock().clear();
    }

    /// Token cancelled on teardown.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether teardown has started.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_connection() -> (Connection, mpsc::Receiver<Arc<String>>) {
        let (out_tx, out_rx) = mpsc::channel(4);
        let (stream_tx, _stream_rx) = mpsc::channel(4);
        let conn = Connection::new(
            "conn_1".into(),
            out_tx,
            stream_tx,
            CancellationToken::new(),
        );
        (conn, out_rx)
    }

    #[tokio::test]
    async fn send_delivers_frame() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())).await);
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_after_write_loop_gone_returns_false() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())).await);
    }

    #[test]
    fn stream_registration() {
        let (conn, _rx) = make_connection();
        let (tx, _rx2) = mpsc::channel(1);
        assert!(!conn.has_stream("feed"));
        assert!(conn.insert_stream("feed", tx));
        assert!(conn.has_stream("feed"));
        assert!(conn.stream_input("feed").is_some());
        assert!(conn.stream_input("other").is_none());
    }

    #[test]
    fn duplicate_stream_rejected() {
        let (conn, _rx) = make_connection();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        assert!(conn.insert_stream("feed", tx1));
        assert!(!conn.insert_stream("feed", tx2));
    }

    #[tokio::test]
    async fn shutdown_cancels_and_closes_streams() {
        let (conn, _rx) = make_connection();
        let (tx, mut stream_rx) = mpsc::channel::<Value>(1);
        assert!(conn.insert_stream("feed", tx));
        assert!(!conn.is_closed());

        conn.shutdown();

        assert!(conn.is_closed());
        assert!(conn.cancel_token().is_cancelled());
        assert!(!conn.has_stream("feed"));
        // input side dropped → readers observe end-of-stream
        assert_eq!(stream_rx.recv().await, None);
    }

    #[tokio::test]
    async fn stream_input_routes_data() {
        let (conn, _rx) = make_connection();
        let (tx, mut rx2) = mpsc::channel(4);
        assert!(conn.insert_stream("feed", tx));

        let input = conn.stream_input("feed").unwrap();
        input.send(json!({"n": 1})).await.unwrap();
        assert_eq!(rx2.recv().await.unwrap()["n"], 1);
    }
}
