//! Test helpers for integration tests
//!
//! Provides a scripted transport standing in for the gateway, and a harness
//! that wires a connection to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chat_client::{
    ClientContext, CloseInfo, GatewayConnection, QueuedSessionManager, SocketHandle, Transport,
    TransportError, TransportEvent,
};
use chat_common::GatewayConfig;
use chat_core::{ClientEvent, CloseFrame};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Token every test connection identifies with
pub const TEST_TOKEN: &str = "test-token";

/// Gateway configuration pointing at the scripted transport
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::new(TEST_TOKEN);
    config.url = "wss://gateway.test/?v=6&encoding=json".to_string();
    config
}

/// Let every runnable task finish its work.
///
/// Tests run on a paused clock, so this advances time by one millisecond
/// only after all other tasks are idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// A frame the client wrote to a socket
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub at: Instant,
    pub text: String,
}

impl SentFrame {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }

    pub fn op(&self) -> Option<u64> {
        self.json().get("op").and_then(Value::as_u64)
    }
}

/// Server end of one scripted socket
pub struct MockSocket {
    events: mpsc::UnboundedSender<TransportEvent>,
    open: AtomicBool,
    frames: Mutex<Vec<SentFrame>>,
    client_close: Mutex<Option<CloseFrame>>,
}

impl MockSocket {
    fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            open: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
            client_close: Mutex::new(None),
        }
    }

    /// Deliver a frame from the gateway
    pub fn push(&self, frame: Value) {
        let _ = self.events.send(TransportEvent::Text(frame.to_string()));
    }

    /// Close from the gateway side
    pub fn server_close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Closed(CloseInfo {
                server_frame: Some(CloseFrame::new(code, reason)),
                client_frame: None,
                closed_by_server: true,
            }));
        }
    }

    /// Drop the socket without any close frame
    pub fn drop_connection(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Closed(CloseInfo::default()));
        }
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().clone()
    }

    /// Frames with the given op code
    pub fn frames_with_op(&self, op: u64) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.op() == Some(op))
            .collect()
    }

    pub fn ops(&self) -> Vec<u64> {
        self.frames().iter().filter_map(SentFrame::op).collect()
    }

    /// Close frame the client sent, if it closed this socket
    pub fn client_close(&self) -> Option<CloseFrame> {
        self.client_close.lock().clone()
    }
}

impl SocketHandle for MockSocket {
    fn send_text(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.frames.lock().push(SentFrame {
            at: Instant::now(),
            text,
        });
        true
    }

    fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            let frame = CloseFrame::new(code, reason);
            *self.client_close.lock() = Some(frame.clone());
            let _ = self.events.send(TransportEvent::Closed(CloseInfo {
                server_frame: None,
                client_frame: Some(frame),
                closed_by_server: false,
            }));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TransportState {
    attempts: Vec<Instant>,
    fail_next: usize,
    sockets: Vec<Arc<MockSocket>>,
}

/// Transport that opens [`MockSocket`]s and records every connect attempt
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect attempts
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// When each connect attempt started, successful or not
    pub fn attempts(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }

    pub fn socket_count(&self) -> usize {
        self.state.lock().sockets.len()
    }

    /// The `index`-th socket opened, starting at 0
    pub fn socket(&self, index: usize) -> Option<Arc<MockSocket>> {
        self.state.lock().sockets.get(index).cloned()
    }

    pub fn latest(&self) -> Option<Arc<MockSocket>> {
        self.state.lock().sockets.last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn SocketHandle>, TransportError> {
        let mut state = self.state.lock();
        state.attempts.push(Instant::now());

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransportError::Connect("scripted failure".to_string()));
        }

        let ray = format!("ray-{}", state.sockets.len() + 1);
        let _ = events.send(TransportEvent::Connected {
            headers: HashMap::from([("cf-ray".to_string(), ray)]),
        });

        let socket = Arc::new(MockSocket::new(events));
        state.sockets.push(Arc::clone(&socket));
        Ok(socket)
    }
}

/// A connection wired to a [`MockTransport`]
pub struct TestGateway {
    pub connection: GatewayConnection,
    pub transport: MockTransport,
    pub session_manager: QueuedSessionManager,
    pub events: broadcast::Receiver<ClientEvent>,
}

impl TestGateway {
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_config()).await
    }

    pub async fn start_with_config(config: GatewayConfig) -> Result<Self> {
        let transport = MockTransport::new();
        let session_manager = QueuedSessionManager::new();
        let context = ClientContext::default();
        let events = context.subscribe();

        let connection = GatewayConnection::start(
            config,
            context,
            Arc::new(transport.clone()),
            Arc::new(session_manager.clone()),
        )
        .await?;
        settle().await;

        Ok(Self {
            connection,
            transport,
            session_manager,
            events,
        })
    }

    /// Current socket
    pub fn socket(&self) -> Arc<MockSocket> {
        self.transport
            .latest()
            .expect("the connection has not opened a socket")
    }

    /// Push frames on the current socket, letting the client process each
    pub async fn push_all(&self, frames: impl IntoIterator<Item = Value>) {
        let socket = self.socket();
        for frame in frames {
            socket.push(frame);
            settle().await;
        }
    }

    /// Every event emitted since the last call
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
            }
        }
    }
}
