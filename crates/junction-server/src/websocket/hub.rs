//! Process-wide registry of live persistent connections.
//!
//! A single coordinator task owns the connection set; all mutation goes
//! through its mailbox, so reader/writer tasks never touch the map
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::connection::Connection;

const MAILBOX_CAPACITY: usize = 64;

enum Command {
    Register(Arc<Connection>),
    Unregister(String),
    Contains(String, oneshot::Sender<bool>),
    Count(oneshot::Sender<usize>),
}

/// Handle to the connection registry coordinator.
///
/// Cloneable; lives for the whole process. Deregistration is idempotent.
/// The coordinator task is spawned on first use, so the handle itself
/// can be constructed outside a Tokio runtime.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<Command>,
    pending: Arc<Mutex<Option<mpsc::Receiver<Command>>>>,
}

impl Hub {
    /// Create a handle; the coordinator task starts with the first
    /// operation.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        Self {
            tx,
            pending: Arc::new(Mutex::new(Some(rx))),
        }
    }

    // Every public operation is async, so a runtime is present here.
    fn ensure_coordinator(&self) {
        if let Some(rx) = self.pending.lock().take() {
            drop(tokio::spawn(run(rx)));
        }
    }

    /// Register a connection.
    pub async fn register(&self, connection: Arc<Connection>) {
        self.ensure_coordinator();
        if self.tx.send(Command::Register(connection)).await.is_err() {
            warn!("hub coordinator is gone");
        }
    }

    /// Remove a connection by id. A no-op when already removed.
    pub async fn unregister(&self, connection_id: &str) {
        self.ensure_coordinator();
        if self
            .tx
            .send(Command::Unregister(connection_id.to_owned()))
            .await
            .is_err()
        {
            warn!("hub coordinator is gone");
        }
    }

    /// Whether the connection is currently registered.
    pub async fn contains(&self, connection_id: &str) -> bool {
        self.ensure_coordinator();
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Contains(connection_id.to_owned(), reply_tx))
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.ensure_coordinator();
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Count(reply_tx)).await.is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut connections: HashMap<String, Arc<Connection>> = HashMap::new();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Register(connection) => {
                debug!(conn_id = %connection.id, "connection registered");
                let _ = connections.insert(connection.id.clone(), connection);
            }
            Command::Unregister(id) => {
                if connections.remove(&id).is_some() {
                    debug!(conn_id = %id, "connection deregistered");
                }
            }
            Command::Contains(id, reply) => {
                let _ = reply.send(connections.contains_key(&id));
            }
            Command::Count(reply) => {
                let _ = reply.send(connections.len());
            }
        }
    }
}
