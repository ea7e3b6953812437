//! Session manager
//!
//! Connections without a resumable session must IDENTIFY again, and the
//! gateway only accepts one IDENTIFY per account every few seconds. A session
//! manager takes those connections and reconnects them one at a time.

use super::connection::IDENTIFY_DELAY;
use super::{GatewayConnection, SessionManagerError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub trait SessionManager: Send + Sync {
    /// Queue a connection for a fresh IDENTIFY
    fn add(&self, connection: GatewayConnection) -> Result<(), SessionManagerError>;

    /// Drop a connection from the queue, if it is there
    fn remove(&self, connection: &GatewayConnection);
}

#[derive(Default)]
struct QueueState {
    queue: Mutex<VecDeque<GatewayConnection>>,
    notify: Notify,
    closed: AtomicBool,
}

/// FIFO session manager drained by a single worker task.
///
/// The worker reconnects one connection at a time and waits
/// [`IDENTIFY_DELAY`] before the next. It is spawned on the first `add`.
#[derive(Clone, Default)]
pub struct QueuedSessionManager {
    state: Arc<QueueState>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl QueuedSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.queue.lock().is_empty()
    }

    pub fn contains(&self, connection: &GatewayConnection) -> bool {
        self.state
            .queue
            .lock()
            .iter()
            .any(|queued| queued.ptr_eq(connection))
    }

    /// Stop the worker and refuse further connections
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.queue.lock().clear();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let state = Arc::clone(&self.state);
        *worker = Some(tokio::spawn(async move {
            loop {
                let next = state.queue.lock().pop_front();
                match next {
                    Some(connection) => {
                        tracing::debug!(queued = state.queue.lock().len(), "Reconnecting queued connection");
                        connection.reconnect(true, true).await;
                        tokio::time::sleep(IDENTIFY_DELAY).await;
                    }
                    None if state.closed.load(Ordering::SeqCst) => return,
                    None => state.notify.notified().await,
                }
            }
        }));
    }
}

impl SessionManager for QueuedSessionManager {
    fn add(&self, connection: GatewayConnection) -> Result<(), SessionManagerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(SessionManagerError::Closed);
        }

        {
            let mut queue = self.state.queue.lock();
            if !queue.iter().any(|queued| queued.ptr_eq(&connection)) {
                queue.push_back(connection);
            }
        }

        self.ensure_worker();
        self.state.notify.notify_one();
        Ok(())
    }

    fn remove(&self, connection: &GatewayConnection) {
        self.state
            .queue
            .lock()
            .retain(|queued| !queued.ptr_eq(connection));
    }
}

impl std::fmt::Debug for QueuedSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedSessionManager")
            .field("queued", &self.len())
            .field("closed", &self.state.closed.load(Ordering::SeqCst))
            .finish()
    }
}
