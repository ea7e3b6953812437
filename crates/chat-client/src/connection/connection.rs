//! Gateway connection
//!
//! Owns one logical shard: the socket lifecycle, the IDENTIFY/RESUME
//! decision, reconnects with backoff, and the state the sender and heartbeat
//! loops share with the socket loop.

use super::{ConnectionError, ConnectionStatus, SessionManager};
use crate::chunking::MemberChunkAggregator;
use crate::context::ClientContext;
use crate::events::RawEvent;
use crate::heartbeat::{Heartbeat, HeartbeatMonitor};
use crate::protocol::{
    classify, CloseCode, CloseDisposition, GatewayMessage, IdentifyPayload, OpCode,
    RequestGuildMembersPayload, ResumePayload, ABNORMAL_CLOSURE, INVALIDATE_SESSION_REASON,
};
use crate::sender::{spawn_sender, Outbound, Priority, RateLimiter, SendQueue};
use crate::transport::{CloseInfo, SocketHandle, Transport, TransportEvent};
use chat_common::GatewayConfig;
use chat_core::{ClientEvent, DisconnectEvent, ShutdownEvent, Snowflake};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Wait before reconnecting after an identify rate limit
pub const IDENTIFY_DELAY: Duration = Duration::from_secs(5);

/// Reconnect delay after a successful connect, in seconds
pub const INITIAL_RECONNECT_DELAY: u64 = 2;

/// Upper bound of the reconnect backoff, in seconds
pub const MAX_RECONNECT_DELAY: u64 = 900;

const NORMAL_CLOSURE: u16 = 1000;

/// Handle to a gateway connection. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct GatewayConnection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    pub(super) config: GatewayConfig,
    pub(super) context: ClientContext,
    transport: Arc<dyn Transport>,
    session_manager: Arc<dyn SessionManager>,

    status: watch::Sender<ConnectionStatus>,
    socket: Mutex<Option<Arc<dyn SocketHandle>>>,

    connected: AtomicBool,
    shutdown: AtomicBool,
    should_reconnect: AtomicBool,
    /// ShutdownEvent already emitted
    terminated: AtomicBool,
    sent_identify: AtomicBool,
    ratelimit_identify: AtomicBool,
    /// First connect or full reload, as opposed to a resume
    pub(super) initiating: AtomicBool,
    /// READY handled, bootstrap not finished yet
    pub(super) systems_ready: AtomicBool,
    pub(super) previously_connected: AtomicBool,
    pub(super) chunking_members: AtomicBool,
    reconnect_delay: AtomicU64,

    session_id: Mutex<Option<String>>,
    sequence: Mutex<Option<u64>>,

    rate_limiter: RateLimiter,
    pub(super) chunk_queue: SendQueue,
    general_queue: SendQueue,
    sender_cancel: watch::Sender<bool>,

    pub(super) replay: Mutex<VecDeque<RawEvent>>,
    pub(super) aggregator: MemberChunkAggregator,
    heartbeat: HeartbeatMonitor,

    traces: Mutex<Vec<String>>,
    rays: Mutex<HashSet<String>>,
}

impl GatewayConnection {
    /// Create a connection and open its first socket.
    ///
    /// The sender loop starts here and lives until shutdown or until the last
    /// handle is dropped.
    pub async fn start(
        config: GatewayConfig,
        context: ClientContext,
        transport: Arc<dyn Transport>,
        session_manager: Arc<dyn SessionManager>,
    ) -> Result<Self, ConnectionError> {
        let inner = Arc::new(ConnectionInner::new(
            config,
            context,
            transport,
            session_manager,
        ));

        spawn_sender(Arc::downgrade(&inner), inner.sender_cancel.subscribe());

        if let Err(e) = inner.connect().await {
            inner.cancel_sender();
            return Err(e);
        }

        Ok(Self { inner })
    }

    /// Queue a pre-serialized frame on the general queue
    pub fn send_message(&self, frame: impl Into<String>) {
        self.inner.general_queue.push(frame.into());
    }

    /// Queue a REQUEST_GUILD_MEMBERS for every member of `guild_id`
    pub fn queue_chunk_request(&self, guild_id: Snowflake) -> Result<(), ConnectionError> {
        let frame =
            GatewayMessage::request_guild_members(&RequestGuildMembersPayload::all(guild_id))?
                .to_json()?;
        self.inner.chunk_queue.push(frame);
        Ok(())
    }

    /// Close for good. The connection will not reconnect.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down gateway connection");
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.should_reconnect.store(false, Ordering::SeqCst);

        self.inner.session_manager.remove(self);

        if !self.inner.close(NORMAL_CLOSURE, "Shutting Down") {
            self.inner.terminate(NORMAL_CLOSURE);
        }
    }

    /// Drop the session and everything cached for it
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    /// Reconnect loop with backoff.
    ///
    /// `use_session_manager` only marks the call as coming from a session
    /// manager; `handle_identify_rate_limit` makes a pending identify rate
    /// limit wait [`IDENTIFY_DELAY`] instead of the backoff delay.
    pub async fn reconnect(&self, use_session_manager: bool, handle_identify_rate_limit: bool) {
        self.inner
            .reconnect(use_session_manager, handle_identify_rate_limit)
            .await;
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// True once the initial sync finished and the session is live
    pub fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.inner.sequence()
    }

    /// Last heartbeat round trip
    pub fn ping(&self) -> Option<Duration> {
        self.inner.heartbeat.ping()
    }

    /// Current reconnect backoff, in seconds
    pub fn reconnect_delay(&self) -> u64 {
        self.inner.reconnect_delay.load(Ordering::SeqCst)
    }

    /// Gateway servers from the last `_trace`
    pub fn traces(&self) -> Vec<String> {
        self.inner.traces.lock().clone()
    }

    /// Every `cf-ray` seen on a handshake
    pub fn rays(&self) -> Vec<String> {
        let mut rays: Vec<_> = self.inner.rays.lock().iter().cloned().collect();
        rays.sort_unstable();
        rays
    }

    pub fn context(&self) -> &ClientContext {
        &self.inner.context
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Frames waiting on the general and chunk queues
    pub fn queued_frames(&self) -> usize {
        self.inner.general_queue.len() + self.inner.chunk_queue.len()
    }

    /// Both handles point at the same connection
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("status", &self.status())
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence())
            .finish_non_exhaustive()
    }
}

impl ConnectionInner {
    fn new(
        config: GatewayConfig,
        context: ClientContext,
        transport: Arc<dyn Transport>,
        session_manager: Arc<dyn SessionManager>,
    ) -> Self {
        let should_reconnect = config.auto_reconnect;
        Self {
            config,
            context,
            transport,
            session_manager,
            status: watch::Sender::new(ConnectionStatus::Disconnected),
            socket: Mutex::new(None),
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            should_reconnect: AtomicBool::new(should_reconnect),
            terminated: AtomicBool::new(false),
            sent_identify: AtomicBool::new(false),
            ratelimit_identify: AtomicBool::new(false),
            initiating: AtomicBool::new(true),
            systems_ready: AtomicBool::new(false),
            previously_connected: AtomicBool::new(false),
            chunking_members: AtomicBool::new(false),
            reconnect_delay: AtomicU64::new(INITIAL_RECONNECT_DELAY),
            session_id: Mutex::new(None),
            sequence: Mutex::new(None),
            rate_limiter: RateLimiter::new(),
            chunk_queue: SendQueue::new(),
            general_queue: SendQueue::new(),
            sender_cancel: watch::Sender::new(false),
            replay: Mutex::new(VecDeque::new()),
            aggregator: MemberChunkAggregator::new(),
            heartbeat: HeartbeatMonitor::new(),
            traces: Mutex::new(Vec::new()),
            rays: Mutex::new(HashSet::new()),
        }
    }

    // === State ===

    pub(super) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Move to `status`. Nothing leaves `Shutdown`.
    pub(super) fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                return false;
            }
            tracing::debug!(from = %current, to = %status, "Connection status changed");
            *current = status;
            true
        });
    }

    pub(super) fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    pub(super) fn set_session_id(&self, session_id: Option<String>) {
        *self.session_id.lock() = session_id;
    }

    pub(super) fn sequence(&self) -> Option<u64> {
        *self.sequence.lock()
    }

    pub(super) fn mark_identified(&self) {
        self.sent_identify.store(true, Ordering::SeqCst);
    }

    pub(super) fn clear_identify_rate_limit(&self) {
        self.ratelimit_identify.store(false, Ordering::SeqCst);
    }

    /// Replace the trace set if `data` carries a `_trace`
    pub(super) fn update_traces(&self, data: &Value, source: &str) {
        let Some(trace) = data.get("_trace").and_then(Value::as_array) else {
            return;
        };

        let traces: Vec<String> = trace
            .iter()
            .map(|t| t.as_str().map_or_else(|| t.to_string(), str::to_string))
            .collect();
        tracing::debug!(source, traces = ?traces, "Received _trace");
        *self.traces.lock() = traces;
    }

    // === Socket lifecycle ===

    async fn connect(self: &Arc<Self>) -> Result<(), ConnectionError> {
        if self.status() != ConnectionStatus::AttemptingToReconnect {
            self.set_status(ConnectionStatus::Connecting);
        }

        if self.shutdown.load(Ordering::SeqCst) {
            return Err(ConnectionError::Shutdown);
        }

        self.initiating.store(true, Ordering::SeqCst);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let socket = self.transport.connect(&self.config.url, events_tx).await?;
        *self.socket.lock() = Some(socket);

        tokio::spawn(Arc::clone(self).run_socket(events_rx));
        Ok(())
    }

    /// Consume one socket's events until it closes
    async fn run_socket(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected { headers } => self.on_connected(&headers),
                TransportEvent::Text(text) => self.on_text(&text),
                TransportEvent::Error(error) => {
                    tracing::warn!(error = %error, "Gateway socket error");
                }
                TransportEvent::Closed(info) => {
                    self.on_close(info);
                    return;
                }
            }
        }

        // Transport went away without reporting a close
        self.on_close(CloseInfo::default());
    }

    fn on_connected(&self, headers: &HashMap<String, String>) {
        if self.shutdown.load(Ordering::SeqCst) {
            self.close(NORMAL_CLOSURE, "Shutting Down");
            return;
        }

        self.set_status(ConnectionStatus::Identifying);
        tracing::info!(url = %self.config.url, "Connected to gateway");

        if let Some(ray) = headers.get("cf-ray") {
            tracing::debug!(ray = %ray, "Received cf-ray");
            self.rays.lock().insert(ray.clone());
        }

        self.connected.store(true, Ordering::SeqCst);
        self.reconnect_delay
            .store(INITIAL_RECONNECT_DELAY, Ordering::SeqCst);
        self.rate_limiter.reset();

        if self.session_id.lock().is_none() {
            self.identify();
        } else {
            self.resume();
        }
    }

    fn identify(&self) {
        let payload = IdentifyPayload::from_config(&self.config);
        match GatewayMessage::identify(&payload).and_then(|msg| msg.to_json()) {
            Ok(frame) => {
                tracing::debug!("Sending IDENTIFY");
                if !self.send(frame, Priority::Control) {
                    tracing::warn!("IDENTIFY was not sent");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode IDENTIFY");
                return;
            }
        }

        self.sent_identify.store(true, Ordering::SeqCst);
        self.ratelimit_identify.store(true, Ordering::SeqCst);
        self.set_status(ConnectionStatus::AwaitingConfirmation);
    }

    fn resume(&self) {
        let Some(session_id) = self.session_id() else {
            return self.identify();
        };

        let payload = ResumePayload {
            token: self.config.auth_token(),
            session_id,
            seq: self.sequence(),
        };

        match GatewayMessage::resume(&payload).and_then(|msg| msg.to_json()) {
            Ok(frame) => {
                tracing::debug!(session_id = %payload.session_id, seq = ?payload.seq, "Sending RESUME");
                if !self.send(frame, Priority::Control) {
                    tracing::warn!("RESUME was not sent");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode RESUME");
                return;
            }
        }

        self.set_status(ConnectionStatus::AwaitingConfirmation);
    }

    /// Send through the rate limiter. False if the frame did not leave.
    fn send(&self, frame: String, priority: Priority) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }

        let Some(socket) = self.socket.lock().clone() else {
            return false;
        };

        tracing::trace!(frame = %frame, ?priority, "Sending frame");
        self.rate_limiter
            .send_with(priority, || socket.send_text(frame))
    }

    fn send_heartbeat(&self) {
        let frame = match GatewayMessage::heartbeat(self.sequence()).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode heartbeat");
                return;
            }
        };

        if !self.send(frame.clone(), Priority::Control) {
            tracing::debug!("Heartbeat held back; queueing it");
            self.general_queue.push(frame);
        }
        self.heartbeat.record_sent();
    }

    fn on_text(self: &Arc<Self>, text: &str) {
        tracing::trace!(frame = %text, "Received frame");

        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, frame = %text, "Failed to decode gateway frame");
                return;
            }
        };

        if let Some(seq) = message.s {
            *self.sequence.lock() = Some(seq);
        }

        match message.opcode() {
            Some(OpCode::Dispatch) => {
                let Some(event_type) = message.t else {
                    tracing::warn!(frame = %text, "Dispatch without an event type");
                    return;
                };
                self.dispatch(RawEvent::new(event_type, message.s, message.d));
            }
            Some(OpCode::Heartbeat) => {
                tracing::debug!("Gateway requested a heartbeat");
                self.send_heartbeat();
            }
            Some(OpCode::Reconnect) => {
                tracing::debug!("Gateway requested a reconnect; closing");
                self.close(CloseCode::UnknownError.as_u16(), "OP 7: RECONNECT");
            }
            Some(OpCode::InvalidSession) => {
                self.sent_identify.store(false, Ordering::SeqCst);

                if message.as_invalid_session().unwrap_or(false) {
                    tracing::debug!("Session invalidated but resumable; closing to RESUME");
                    self.close(CloseCode::UnknownError.as_u16(), INVALIDATE_SESSION_REASON);
                } else {
                    tracing::debug!("Session invalidated; closing to IDENTIFY");
                    self.invalidate();
                    self.close(NORMAL_CLOSURE, INVALIDATE_SESSION_REASON);
                }
            }
            Some(OpCode::Hello) => match message.as_hello() {
                Some(hello) => {
                    tracing::debug!(interval_ms = hello.heartbeat_interval, "Received HELLO");
                    self.heartbeat.start(
                        Arc::clone(self),
                        Duration::from_millis(hello.heartbeat_interval),
                    );
                    self.update_traces(&message.d, "HELLO");
                }
                None => tracing::warn!(data = %message.d, "Malformed HELLO"),
            },
            Some(OpCode::HeartbeatAck) => {
                if let Some(ping) = self.heartbeat.record_ack() {
                    tracing::trace!(ping_ms = ping.as_millis(), "Heartbeat acknowledged");
                }
            }
            Some(op) => {
                tracing::warn!(op = %op, data = %message.d, "Unexpected op code from gateway");
            }
            None => {
                tracing::warn!(op = message.op, data = %message.d, "Unknown op code");
            }
        }
    }

    /// Start the closing handshake. Returns false if no socket was open.
    fn close(&self, code: u16, reason: &str) -> bool {
        let socket = self.socket.lock().clone();
        let open = match socket {
            Some(socket) if socket.is_open() => {
                tracing::debug!(code, reason, "Closing gateway socket");
                socket.close(code, reason);
                true
            }
            _ => false,
        };

        if !self.should_reconnect.load(Ordering::SeqCst) {
            self.heartbeat.stop();
            self.cancel_sender();
        }

        open
    }

    fn on_close(self: &Arc<Self>, info: CloseInfo) {
        self.sent_identify.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Disconnected);
        self.heartbeat.stop();
        *self.socket.lock() = None;

        let raw = info
            .server_frame
            .as_ref()
            .or(info.client_frame.as_ref())
            .map_or(ABNORMAL_CLOSURE, |frame| frame.code);

        let invalidated = info.client_frame.as_ref().is_some_and(|frame| {
            frame.code == NORMAL_CLOSURE && frame.reason == INVALIDATE_SESSION_REASON
        });

        match CloseCode::from_u16(raw) {
            Some(CloseCode::RateLimited) => {
                tracing::error!("Gateway closed the socket for rate limiting: 120 frames in under a minute");
            }
            Some(code) => tracing::debug!(close_code = %code, "Gateway socket closed"),
            None => tracing::warn!(close_code = raw, "Gateway socket closed with an unknown code"),
        }

        let disposition = classify(raw, invalidated, info.closed_by_server);

        if !disposition.is_reconnect() || !self.should_reconnect.load(Ordering::SeqCst) {
            if !disposition.is_reconnect() {
                tracing::error!(close_code = raw, "Gateway connection closed and cannot be recovered");
            }
            self.terminate(raw);
            return;
        }

        if disposition == CloseDisposition::ReconnectAfterIdentifyDelay {
            self.ratelimit_identify.store(true, Ordering::SeqCst);
        }

        if invalidated {
            self.invalidate();
        }

        self.context.emit(ClientEvent::Disconnect(DisconnectEvent::new(
            info.server_frame,
            info.client_frame,
            info.closed_by_server,
        )));

        if self.session_id.lock().is_none() {
            if !self.ratelimit_identify.load(Ordering::SeqCst) {
                tracing::warn!("Gateway connection dropped; queueing for reconnect");
            }
            let connection = GatewayConnection {
                inner: Arc::clone(self),
            };
            if let Err(e) = self.session_manager.add(connection) {
                tracing::error!(error = %e, "Session manager rejected the connection");
            }
        } else {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.reconnect(false, true).await });
        }
    }

    async fn reconnect(self: &Arc<Self>, use_session_manager: bool, handle_identify: bool) {
        if self.shutdown.load(Ordering::SeqCst) {
            self.terminate(NORMAL_CLOSURE);
            return;
        }

        if !self.ratelimit_identify.load(Ordering::SeqCst) {
            let delay_secs = self.reconnect_delay.load(Ordering::SeqCst);
            match self.config.shard {
                Some(shard) if use_session_manager => tracing::warn!(
                    shard_id = shard.shard_id,
                    shard_count = shard.shard_count,
                    delay_secs,
                    "Session manager reconnecting shard"
                ),
                _ => tracing::warn!(delay_secs, "Gateway connection dropped; reconnecting"),
            }
        }

        while self.should_reconnect.load(Ordering::SeqCst) {
            self.set_status(ConnectionStatus::WaitingToReconnect);

            let delay = if handle_identify && self.ratelimit_identify.load(Ordering::SeqCst) {
                tracing::error!(
                    delay_secs = IDENTIFY_DELAY.as_secs(),
                    "IDENTIFY rate limited; waiting before the next attempt"
                );
                IDENTIFY_DELAY
            } else {
                Duration::from_secs(self.reconnect_delay.load(Ordering::SeqCst))
            };
            tokio::time::sleep(delay).await;

            self.set_status(ConnectionStatus::AttemptingToReconnect);
            self.ratelimit_identify.store(false, Ordering::SeqCst);
            tracing::info!("Attempting to reconnect");

            match self.connect().await {
                Ok(()) => break,
                Err(ConnectionError::Shutdown) => {
                    self.terminate(NORMAL_CLOSURE);
                    return;
                }
                Err(e) => {
                    let next = self
                        .reconnect_delay
                        .load(Ordering::SeqCst)
                        .saturating_mul(2)
                        .min(MAX_RECONNECT_DELAY);
                    self.reconnect_delay.store(next, Ordering::SeqCst);
                    tracing::warn!(error = %e, retry_in_secs = next, "Failed to reconnect");
                }
            }
        }
    }

    /// Enter `Shutdown` and emit the terminal event (once)
    fn terminate(&self, close_code: u16) {
        self.heartbeat.stop();
        self.cancel_sender();
        self.set_status(ConnectionStatus::Shutdown);

        if !self.terminated.swap(true, Ordering::SeqCst) {
            tracing::info!(close_code, "Gateway connection shut down");
            self.context
                .emit(ClientEvent::Shutdown(ShutdownEvent::new(close_code)));
        }
    }

    fn cancel_sender(&self) {
        self.sender_cancel.send_replace(true);
    }

    pub(super) fn invalidate(&self) {
        self.set_session_id(None);
        self.sent_identify.store(false, Ordering::SeqCst);
        self.chunking_members.store(false, Ordering::SeqCst);

        let dropped = self.chunk_queue.clear();
        self.context.caches().clear_all();
        self.aggregator.clear();
        self.rate_limiter.reset();
        self.heartbeat.reset();

        tracing::debug!(dropped_chunk_requests = dropped, "Session invalidated");
    }
}

impl Outbound for ConnectionInner {
    fn ready_to_send(&self) -> bool {
        self.sent_identify.load(Ordering::SeqCst)
    }

    fn chunk_queue(&self) -> &SendQueue {
        &self.chunk_queue
    }

    fn general_queue(&self) -> &SendQueue {
        &self.general_queue
    }

    fn send_queued(&self, frame: &str) -> bool {
        self.send(frame.to_string(), Priority::Queued)
    }
}

impl Heartbeat for ConnectionInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn beat(&self) {
        self.send_heartbeat();
    }
}
