//! Gateway connection integration tests
//!
//! Every test drives a real connection against the scripted transport on a
//! paused clock, so reconnect and heartbeat timings are exact.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use chat_cache::EntityCache;
use chat_client::ConnectionStatus;
use chat_core::{ClientEvent, Snowflake};
use integration_tests::{fixtures::*, settle, SentFrame, TestGateway, TEST_TOKEN};
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RESUME: u64 = 6;
const OP_REQUEST_GUILD_MEMBERS: u64 = 8;

fn dispatch_contents(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Dispatch(dispatch) if dispatch.event_type == "MESSAGE_CREATE" => dispatch
                .data
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn dispatch_types(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Dispatch(dispatch) => Some(dispatch.event_type.clone()),
            _ => None,
        })
        .collect()
}

fn shutdown_codes(events: &[ClientEvent]) -> Vec<u16> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::Shutdown(shutdown) => Some(shutdown.close_code),
            _ => None,
        })
        .collect()
}

/// Start a connection and finish a READY with no guilds
async fn ready_gateway(session_id: &str) -> TestGateway {
    let mut gateway = TestGateway::start().await.unwrap();
    gateway.push_all([ready(session_id, 1, &[])]).await;
    assert!(gateway.connection.is_ready());
    gateway.drain_events();
    gateway
}

// ============================================================================
// Identify / Ready
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_identify_then_ready() {
    let mut gateway = TestGateway::start().await.unwrap();
    let socket = gateway.socket();

    let identify = socket.frames_with_op(OP_IDENTIFY);
    assert_eq!(identify.len(), 1);
    let payload = identify[0].json();
    assert_eq!(payload["d"]["token"], format!("Bot {TEST_TOKEN}"));
    assert_eq!(payload["d"]["large_threshold"], 250);
    assert_eq!(payload["d"]["compress"], false);
    assert_eq!(
        gateway.connection.status(),
        ConnectionStatus::AwaitingConfirmation
    );
    assert_eq!(gateway.connection.rays(), vec!["ray-1".to_string()]);

    gateway.push_all([ready("sess-1", 1, &[])]).await;

    assert_eq!(gateway.connection.status(), ConnectionStatus::Connected);
    assert_eq!(gateway.connection.session_id().as_deref(), Some("sess-1"));
    assert_eq!(gateway.connection.traces(), vec![TRACE.to_string()]);

    let events = gateway.drain_events();
    assert!(
        matches!(events.as_slice(), [ClientEvent::Ready(ready)] if ready.response_total == 1),
        "unexpected events: {events:?}"
    );

    let caches = gateway.connection.context().caches();
    assert!(caches.users.contains(Snowflake::new(1)));
}

#[tokio::test(start_paused = true)]
async fn test_ready_waits_for_pending_guilds() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway.push_all([ready("sess-1", 1, &[10, 20])]).await;
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);

    gateway.push_all([guild_create(10, 2, 5)]).await;
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);
    assert!(gateway.drain_events().is_empty());

    gateway.push_all([guild_create(20, 3, 5)]).await;
    assert!(gateway.connection.is_ready());

    let events = gateway.drain_events();
    assert!(
        matches!(events.as_slice(), [ClientEvent::Ready(ready)] if ready.response_total == 3),
        "unexpected events: {events:?}"
    );

    let caches = gateway.connection.context().caches();
    assert!(caches.guilds.contains(Snowflake::new(10)));
    assert!(caches.guilds.contains(Snowflake::new(20)));
    assert!(caches.text_channels.contains(Snowflake::new(100)));
    assert!(caches.pending_guilds.is_empty());
}

// ============================================================================
// Replay buffer
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_buffered_events_replay_in_order_before_live_events() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10]),
            message_create(2, "A"),
            message_create(3, "B"),
            message_create(4, "C"),
        ])
        .await;

    // Still waiting on guild 10; nothing has been delivered
    assert!(dispatch_contents(&gateway.drain_events()).is_empty());

    gateway
        .push_all([guild_create(10, 5, 5), message_create(6, "D")])
        .await;

    let events = gateway.drain_events();
    assert!(matches!(events.first(), Some(ClientEvent::Ready(_))));
    assert_eq!(dispatch_contents(&events), ["A", "B", "C", "D"]);
    assert_eq!(gateway.connection.sequence(), Some(6));
}

// ============================================================================
// Member chunking
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_member_chunking_gates_ready() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([ready("sess-1", 1, &[10]), guild_create(10, 2, 300)])
        .await;
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);

    // The sender loop picks up the chunk request on its next poll
    sleep(Duration::from_secs(2)).await;
    let requests = gateway.socket().frames_with_op(OP_REQUEST_GUILD_MEMBERS);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].json()["d"]["guild_id"], "10");

    gateway.push_all([members_chunk(10, 3, 1_000, 200)]).await;
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);
    assert!(gateway.drain_events().is_empty());

    gateway.push_all([members_chunk(10, 4, 1_200, 100)]).await;
    assert!(gateway.connection.is_ready());
    assert!(matches!(
        gateway.drain_events().as_slice(),
        [ClientEvent::Ready(_)]
    ));

    let caches = gateway.connection.context().caches();
    assert!(caches.users.contains(Snowflake::new(1_000)));
    assert!(caches.users.contains(Snowflake::new(1_299)));
}

#[tokio::test(start_paused = true)]
async fn test_events_during_chunking_are_replayed() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10]),
            guild_create(10, 2, 300),
            message_create(3, "while chunking"),
            members_chunk(10, 4, 1_000, 300),
        ])
        .await;

    let events = gateway.drain_events();
    assert!(matches!(events.first(), Some(ClientEvent::Ready(_))));
    assert_eq!(dispatch_contents(&events), ["while chunking"]);
}

#[tokio::test(start_paused = true)]
async fn test_guild_held_back_by_chunking_is_not_a_join() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10, 20]),
            guild_create(10, 2, 300),
            guild_create(20, 3, 5),
            members_chunk(10, 4, 1_000, 300),
        ])
        .await;
    assert!(gateway.connection.is_ready());

    let events = gateway.drain_events();
    assert!(
        matches!(events.as_slice(), [ClientEvent::Ready(_)]),
        "unexpected events: {events:?}"
    );

    let caches = gateway.connection.context().caches();
    assert!(caches.guilds.contains(Snowflake::new(20)));
    assert!(caches.text_channels.contains(Snowflake::new(200)));
}

#[tokio::test(start_paused = true)]
async fn test_member_add_while_chunking_raises_expected_count() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10]),
            guild_create(10, 2, 300),
            dispatch(
                "GUILD_MEMBER_ADD",
                3,
                json!({"guild_id": "10", "user": {"id": "77", "username": "late"}}),
            ),
            members_chunk(10, 4, 1_000, 300),
        ])
        .await;

    // 300 of 301
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);
    assert!(gateway.drain_events().is_empty());

    gateway.push_all([members_chunk(10, 5, 77, 1)]).await;
    assert!(gateway.connection.is_ready());

    let types = dispatch_types(&gateway.drain_events());
    assert_eq!(types, ["GUILD_MEMBER_ADD"]);
}

#[tokio::test(start_paused = true)]
async fn test_member_remove_while_chunking_lowers_expected_count() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10]),
            guild_create(10, 2, 300),
            dispatch(
                "GUILD_MEMBER_REMOVE",
                3,
                json!({"guild_id": "10", "user": {"id": "1299"}}),
            ),
            members_chunk(10, 4, 1_000, 299),
        ])
        .await;

    assert!(gateway.connection.is_ready());
    let events = gateway.drain_events();
    assert!(matches!(events.first(), Some(ClientEvent::Ready(_))));
    assert_eq!(dispatch_types(&events), ["GUILD_MEMBER_REMOVE"]);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_guild_delete_while_chunking_counts_as_arrival() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway
        .push_all([
            ready("sess-1", 1, &[10, 20]),
            guild_create(10, 2, 300),
            dispatch("GUILD_DELETE", 3, json!({"id": "20", "unavailable": true})),
        ])
        .await;

    let pending = &gateway.connection.context().caches().pending_guilds;
    assert!(!pending.is_pending(Snowflake::new(20)));
    assert_eq!(gateway.connection.status(), ConnectionStatus::SettingUp);

    gateway.push_all([members_chunk(10, 4, 1_000, 300)]).await;
    assert!(gateway.connection.is_ready());

    let events = gateway.drain_events();
    assert!(
        matches!(events.as_slice(), [ClientEvent::Ready(_)]),
        "unexpected events: {events:?}"
    );
    let caches = gateway.connection.context().caches();
    assert!(!caches.guilds.contains(Snowflake::new(20)));
}

#[tokio::test(start_paused = true)]
async fn test_presences_replace_is_dropped() {
    let mut gateway = ready_gateway("sess-1").await;

    gateway
        .push_all([
            dispatch("PRESENCES_REPLACE", 2, json!([])),
            message_create(3, "after"),
        ])
        .await;

    let events = gateway.drain_events();
    assert_eq!(dispatch_types(&events), ["MESSAGE_CREATE"]);
    assert_eq!(gateway.connection.sequence(), Some(3));
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_schedule() {
    let gateway = ready_gateway("sess-1").await;
    let socket = gateway.socket();

    let start = Instant::now();
    socket.push(hello(41_250));
    sleep(Duration::from_secs(90)).await;

    let offsets: Vec<u128> = socket
        .frames_with_op(OP_HEARTBEAT)
        .iter()
        .map(|frame: &SentFrame| (frame.at - start).as_millis())
        .collect();

    assert_eq!(offsets.len(), 3, "heartbeats at {offsets:?}");
    assert!(offsets[0] <= 1);
    assert!((41_250..=41_252).contains(&offsets[1]), "{offsets:?}");
    assert!((82_500..=82_503).contains(&offsets[2]), "{offsets:?}");

    // Heartbeats carry the last sequence seen
    assert_eq!(socket.frames_with_op(OP_HEARTBEAT)[0].json()["d"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_ack_measures_ping() {
    let gateway = ready_gateway("sess-1").await;
    assert!(gateway.connection.ping().is_none());

    gateway.push_all([hello(41_250)]).await;
    sleep(Duration::from_millis(50)).await;
    gateway.push_all([heartbeat_ack()]).await;

    let ping = gateway.connection.ping().unwrap();
    assert!(ping >= Duration::from_millis(50));
    assert!(ping < Duration::from_millis(60));
}

#[tokio::test(start_paused = true)]
async fn test_server_heartbeat_request_is_answered() {
    let gateway = ready_gateway("sess-1").await;

    gateway.push_all([heartbeat_request()]).await;

    assert_eq!(gateway.socket().frames_with_op(OP_HEARTBEAT).len(), 1);
}

// ============================================================================
// Invalid session / resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_session_not_resumable_identifies_again() {
    let mut gateway = ready_gateway("sess-1").await;
    let first = gateway.socket();

    gateway.push_all([invalid_session(false)]).await;

    let close = first.client_close().unwrap();
    assert_eq!(close.code, 1000);
    assert_eq!(close.reason, "INVALIDATE_SESSION");
    assert!(gateway.connection.session_id().is_none());

    sleep(Duration::from_secs(10)).await;

    assert_eq!(gateway.transport.socket_count(), 2);
    let second = gateway.socket();
    assert_eq!(second.ops().first(), Some(&OP_IDENTIFY));
    assert!(second.frames_with_op(OP_RESUME).is_empty());

    let events = gateway.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::Disconnect(_))));
    assert!(shutdown_codes(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_resumable_resumes() {
    let gateway = ready_gateway("sess-1").await;
    let first = gateway.socket();

    gateway.push_all([invalid_session(true)]).await;
    assert_eq!(first.client_close().map(|c| c.code), Some(4000));
    assert_eq!(gateway.connection.session_id().as_deref(), Some("sess-1"));

    sleep(Duration::from_secs(5)).await;

    let second = gateway.socket();
    assert_eq!(second.ops().first(), Some(&OP_RESUME));
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_server_close() {
    let mut gateway = ready_gateway("sess-1").await;
    gateway
        .push_all([message_create(2, "before"), message_create(3, "before")])
        .await;
    gateway.drain_events();

    gateway.socket().server_close(4000, "Unknown error");
    settle().await;
    assert_eq!(
        gateway.connection.status(),
        ConnectionStatus::WaitingToReconnect
    );

    sleep(Duration::from_secs(3)).await;

    let second = gateway.socket();
    let resume = second.frames_with_op(OP_RESUME);
    assert_eq!(resume.len(), 1);
    let payload = resume[0].json();
    assert_eq!(payload["d"]["session_id"], "sess-1");
    assert_eq!(payload["d"]["seq"], 3);
    assert_eq!(payload["d"]["token"], format!("Bot {TEST_TOKEN}"));
    assert!(second.frames_with_op(OP_IDENTIFY).is_empty());

    // Missed events arrive before RESUMED and are held until it lands
    gateway
        .push_all([message_create(4, "missed"), resumed(5)])
        .await;
    gateway.push_all([message_create(6, "live")]).await;

    assert!(gateway.connection.is_ready());
    let events = gateway.drain_events();
    assert_eq!(dispatch_contents(&events), ["missed", "live"]);
    // Resuming never fires a second ReadyEvent
    assert!(!events
        .iter()
        .any(|event| matches!(event, ClientEvent::Ready(_))));
}

#[tokio::test(start_paused = true)]
async fn test_op_reconnect_closes_and_resumes() {
    let gateway = ready_gateway("sess-1").await;
    let first = gateway.socket();

    gateway.push_all([reconnect()]).await;
    assert_eq!(first.client_close().map(|c| c.code), Some(4000));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(gateway.socket().ops().first(), Some(&OP_RESUME));
}

// ============================================================================
// Reconnect backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_doubles_then_resets() {
    let gateway = ready_gateway("sess-1").await;
    gateway.transport.fail_next(3);

    let closed_at = Instant::now();
    gateway.socket().server_close(4000, "Unknown error");
    sleep(Duration::from_secs(40)).await;

    let offsets: Vec<u64> = gateway
        .transport
        .attempts()
        .iter()
        .skip(1)
        .map(|at| (*at - closed_at).as_secs())
        .collect();
    assert_eq!(offsets, [2, 6, 14, 30]);

    assert_eq!(gateway.transport.socket_count(), 2);
    assert_eq!(gateway.connection.reconnect_delay(), 2);
    assert_eq!(gateway.socket().ops().first(), Some(&OP_RESUME));
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_drop_reconnects() {
    let gateway = ready_gateway("sess-1").await;

    gateway.socket().drop_connection();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(gateway.transport.socket_count(), 2);
    assert_eq!(gateway.socket().ops().first(), Some(&OP_RESUME));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_close_waits_identify_delay() {
    let gateway = ready_gateway("sess-1").await;
    gateway.connection.invalidate();

    let closed_at = Instant::now();
    gateway.socket().server_close(4008, "Rate limited");
    sleep(Duration::from_secs(10)).await;

    let attempts = gateway.transport.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!((attempts[1] - closed_at).as_secs(), 5);
    assert_eq!(gateway.socket().ops().first(), Some(&OP_IDENTIFY));
}

// ============================================================================
// Fatal close / shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = TestGateway::start().await.unwrap();

    gateway.socket().server_close(4004, "Authentication failed");
    settle().await;

    assert_eq!(gateway.connection.status(), ConnectionStatus::Shutdown);
    assert_eq!(shutdown_codes(&gateway.drain_events()), [4004]);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.transport.attempts().len(), 1);
    assert!(gateway.session_manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_emits_once_and_never_reconnects() {
    let mut gateway = ready_gateway("sess-1").await;

    gateway.connection.shutdown();
    settle().await;
    gateway.connection.shutdown();
    settle().await;

    assert_eq!(gateway.socket().client_close().map(|c| c.code), Some(1000));
    assert_eq!(gateway.connection.status(), ConnectionStatus::Shutdown);
    assert_eq!(shutdown_codes(&gateway.drain_events()), [1000]);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.transport.attempts().len(), 1);
    assert_eq!(gateway.connection.status(), ConnectionStatus::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_stops_reconnect() {
    let mut gateway = ready_gateway("sess-1").await;

    gateway.socket().server_close(4000, "Unknown error");
    settle().await;
    gateway.connection.shutdown();
    settle().await;

    sleep(Duration::from_secs(30)).await;

    assert_eq!(gateway.transport.attempts().len(), 1);
    assert_eq!(gateway.connection.status(), ConnectionStatus::Shutdown);
    assert_eq!(shutdown_codes(&gateway.drain_events()), [1000]);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_disabled_shuts_down_on_close() {
    let mut config = integration_tests::test_config();
    config.auto_reconnect = false;
    let mut gateway = TestGateway::start_with_config(config).await.unwrap();

    gateway.socket().server_close(4000, "Unknown error");
    settle().await;

    assert_eq!(shutdown_codes(&gateway.drain_events()), [4000]);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.transport.attempts().len(), 1);
}

// ============================================================================
// Invalidate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalidate_is_idempotent() {
    let mut gateway = TestGateway::start().await.unwrap();
    gateway
        .push_all([ready("sess-1", 1, &[10]), guild_create(10, 2, 5)])
        .await;
    assert!(gateway.connection.is_ready());

    gateway.connection.invalidate();
    gateway
        .connection
        .queue_chunk_request(Snowflake::new(10))
        .unwrap();
    gateway.connection.invalidate();

    assert!(gateway.connection.session_id().is_none());
    assert_eq!(gateway.connection.queued_frames(), 0);
    assert_eq!(gateway.connection.context().caches().total_len(), 0);

    gateway.socket().server_close(4000, "Unknown error");
    sleep(Duration::from_secs(10)).await;

    assert_eq!(gateway.socket().ops().first(), Some(&OP_IDENTIFY));
    let events = gateway.drain_events();
    assert!(shutdown_codes(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_resets_rate_window_and_ping() {
    let gateway = TestGateway::start().await.unwrap();
    let socket = gateway.socket();

    gateway.push_all([hello(41_250)]).await;
    sleep(Duration::from_millis(50)).await;
    gateway.push_all([heartbeat_ack()]).await;
    assert!(gateway.connection.ping().is_some());

    for n in 0..200 {
        gateway
            .connection
            .send_message(format!(r#"{{"op":3,"d":{{"n":{n}}}}}"#));
    }
    sleep(Duration::from_secs(10)).await;
    for _ in 0..10 {
        gateway.push_all([heartbeat_request()]).await;
    }
    // Hard cap reached
    assert_eq!(socket.frames().len(), 120);

    gateway.connection.invalidate();
    assert!(gateway.connection.ping().is_none());

    gateway.push_all([heartbeat_request()]).await;
    assert_eq!(socket.frames().len(), 121);
    assert_eq!(socket.frames().last().unwrap().op(), Some(OP_HEARTBEAT));
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_queued_frames_respect_soft_cap() {
    let gateway = TestGateway::start().await.unwrap();
    let socket = gateway.socket();

    for n in 0..200 {
        gateway
            .connection
            .send_message(format!(r#"{{"op":3,"d":{{"n":{n}}}}}"#));
    }

    sleep(Duration::from_secs(10)).await;
    // IDENTIFY counts against the window too
    assert_eq!(socket.frames().len(), 115);
    assert_eq!(socket.frames_with_op(3).len(), 114);

    // Control frames may still use the headroom up to the hard cap
    for _ in 0..6 {
        gateway.push_all([heartbeat_request()]).await;
    }
    assert_eq!(socket.frames_with_op(OP_HEARTBEAT).len(), 5);
    assert_eq!(socket.frames().len(), 120);

    // Next window
    sleep(Duration::from_secs(55)).await;
    assert_eq!(socket.frames_with_op(3).len(), 200);

    let order: Vec<u64> = socket
        .frames_with_op(3)
        .iter()
        .filter_map(|frame| frame.json()["d"]["n"].as_u64())
        .collect();
    assert_eq!(order, (0..200).collect::<Vec<_>>());
}
