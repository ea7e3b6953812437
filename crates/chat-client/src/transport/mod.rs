//! Socket abstraction
//!
//! The connection never touches a websocket directly. A [`Transport`] opens
//! sockets and reports everything that happens on them as [`TransportEvent`]s
//! over a single channel, which the connection consumes from one loop.

mod websocket;

pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use chat_core::CloseFrame;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Everything a socket reports back to its connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake finished. Header names are lowercase.
    Connected { headers: HashMap<String, String> },
    /// A text frame arrived
    Text(String),
    /// Non-fatal socket error; a `Closed` event follows if the socket died
    Error(String),
    /// The socket is gone. Always the last event of a socket.
    Closed(CloseInfo),
}

/// Close frames seen on each side when a socket ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub server_frame: Option<CloseFrame>,
    pub client_frame: Option<CloseFrame>,
    pub closed_by_server: bool,
}

/// Write half of an open socket
pub trait SocketHandle: Send + Sync {
    /// Queue a text frame. Returns false if the socket is not open.
    fn send_text(&self, text: String) -> bool;

    /// Start the closing handshake. The matching `Closed` event arrives later.
    fn close(&self, code: u16, reason: &str);

    fn is_open(&self) -> bool;
}

/// Opens sockets
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`, reporting socket events on `events`.
    ///
    /// The first event on success is `Connected`; the last is `Closed`.
    async fn connect(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn SocketHandle>, TransportError>;
}

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid gateway url: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}
