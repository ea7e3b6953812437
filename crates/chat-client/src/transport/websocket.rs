//! tokio-tungstenite implementation of [`Transport`]
//!
//! Each socket is split into a reader task, which turns incoming frames into
//! [`TransportEvent`]s, and a writer task fed through an unbounded channel.

use super::{CloseInfo, SocketHandle, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use chat_core::CloseFrame;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode as WsCloseCode, CloseFrame as WsCloseFrame},
    Message,
};

/// Websocket transport over tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

enum Outgoing {
    Text(String),
    Close(u16, String),
}

/// State shared between a handle and its reader task
struct SocketState {
    open: AtomicBool,
    /// First close frame the client sent, if any
    client_frame: Mutex<Option<CloseFrame>>,
}

struct WebSocketHandle {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    state: Arc<SocketState>,
}

impl SocketHandle for WebSocketHandle {
    fn send_text(&self, text: String) -> bool {
        if !self.state.open.load(Ordering::Acquire) {
            return false;
        }
        self.outgoing.send(Outgoing::Text(text)).is_ok()
    }

    fn close(&self, code: u16, reason: &str) {
        {
            let mut client_frame = self.state.client_frame.lock();
            if client_frame.is_some() {
                return;
            }
            *client_frame = Some(CloseFrame::new(code, reason));
        }
        self.state.open.store(false, Ordering::Release);
        let _ = self.outgoing.send(Outgoing::Close(code, reason.to_string()));
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn SocketHandle>, TransportError> {
        let (stream, response) = connect_async(url).await.map_err(|e| match e {
            tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
            tungstenite::Error::Http(response) => {
                TransportError::Handshake(format!("HTTP {}", response.status()))
            }
            other => TransportError::Connect(other.to_string()),
        })?;

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        tracing::debug!(url = %url, "WebSocket handshake complete");
        let _ = events.send(TransportEvent::Connected { headers });

        let (mut write, mut read) = stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();
        let state = Arc::new(SocketState {
            open: AtomicBool::new(true),
            client_frame: Mutex::new(None),
        });

        // Spawn task to write frames to the socket
        let writer = tokio::spawn(async move {
            while let Some(outgoing) = outgoing_rx.recv().await {
                let message = match outgoing {
                    Outgoing::Text(text) => {
                        tracing::trace!(frame = %text, "Sending frame");
                        Message::Text(text)
                    }
                    Outgoing::Close(code, reason) => Message::Close(Some(WsCloseFrame {
                        code: WsCloseCode::from(code),
                        reason: reason.into(),
                    })),
                };

                if let Err(e) = write.send(message).await {
                    tracing::debug!(error = %e, "Failed to write to WebSocket");
                    break;
                }
            }
        });

        // Spawn task to read frames from the socket
        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut server_frame: Option<CloseFrame> = None;
            let mut closed_by_server = false;

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if events.send(TransportEvent::Text(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        closed_by_server = reader_state.client_frame.lock().is_none();
                        server_frame = Some(frame.map_or_else(
                            || CloseFrame::new(1005, ""),
                            |f| CloseFrame::new(u16::from(f.code), f.reason.into_owned()),
                        ));
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::warn!(len = data.len(), "Ignoring binary frame");
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        break;
                    }
                    Err(e) => {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            reader_state.open.store(false, Ordering::Release);
            writer.abort();

            let info = CloseInfo {
                server_frame,
                client_frame: reader_state.client_frame.lock().clone(),
                closed_by_server,
            };
            tracing::debug!(?info, "WebSocket closed");
            let _ = events.send(TransportEvent::Closed(info));
        });

        Ok(Arc::new(WebSocketHandle {
            outgoing: outgoing_tx,
            state,
        }))
    }
}
