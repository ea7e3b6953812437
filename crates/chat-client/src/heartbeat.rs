//! Heartbeat monitor
//!
//! Started on HELLO with the interval the gateway asks for, one task per
//! socket. Each cycle sends a heartbeat and sleeps; the loop ends on its own
//! once the socket is gone, and the connection aborts it on close.

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What the heartbeat loop needs from a connection
pub trait Heartbeat: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Shutdown was requested; a crashed loop is not restarted
    fn is_shutting_down(&self) -> bool;

    /// Send one heartbeat with the last sequence seen
    fn beat(&self);
}

#[derive(Debug, Default)]
struct HeartbeatState {
    interval: Option<Duration>,
    last_sent: Option<Instant>,
    ping: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    state: Mutex<HeartbeatState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start beating every `interval`, replacing any running loop
    pub fn start<H: Heartbeat>(&self, target: Arc<H>, interval: Duration) {
        self.state.lock().interval = Some(interval);

        let handle = tokio::spawn(async move {
            loop {
                let run = AssertUnwindSafe(beat_loop(&*target, interval))
                    .catch_unwind()
                    .await;

                match run {
                    Ok(()) => break,
                    Err(_) if target.is_shutting_down() => break,
                    Err(_) => tracing::error!("Heartbeat loop panicked; restarting"),
                }
            }
            tracing::debug!("Heartbeat loop stopped");
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// A heartbeat just left
    pub fn record_sent(&self) {
        self.state.lock().last_sent = Some(Instant::now());
    }

    /// HEARTBEAT_ACK arrived. Returns the measured round trip.
    pub fn record_ack(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let ping = state.last_sent.map(|sent| sent.elapsed());
        if ping.is_some() {
            state.ping = ping;
        }
        ping
    }

    /// Forget the last send and round trip; the loop keeps running
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_sent = None;
        state.ping = None;
    }

    /// Last measured round trip
    pub fn ping(&self) -> Option<Duration> {
        self.state.lock().ping
    }

    pub fn interval(&self) -> Option<Duration> {
        self.state.lock().interval
    }
}

async fn beat_loop<H: Heartbeat>(target: &H, interval: Duration) {
    while target.is_connected() {
        target.beat();
        tokio::time::sleep(interval).await;
    }
}
