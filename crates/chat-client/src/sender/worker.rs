//! The sender loop
//!
//! One task per connection drains the chunk-request queue, then the general
//! queue, one frame at a time. It lives for the whole connection (across
//! reconnects) and stops when cancelled or when the connection is dropped.

use super::queue::SendQueue;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Poll interval while waiting for the session to be identified
pub const IDLE_POLL: Duration = Duration::from_millis(500);

/// Back-off after a refused send or when there is nothing to send
pub const SEND_BACKOFF: Duration = Duration::from_secs(1);

/// Pause between two successful sends
pub const SEND_YIELD: Duration = Duration::from_millis(1);

/// What the sender loop needs from a connection
pub trait Outbound: Send + Sync + 'static {
    /// IDENTIFY went out (or the session resumed) on the current socket
    fn ready_to_send(&self) -> bool;

    fn chunk_queue(&self) -> &SendQueue;

    fn general_queue(&self) -> &SendQueue;

    /// Send one queued frame under the soft cap. False if it did not leave.
    fn send_queued(&self, frame: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Refused,
    Empty,
}

/// Try to send the frame at the head of the first non-empty queue.
///
/// The frame is popped only if it left.
pub fn send_next<O: Outbound + ?Sized>(outbound: &O) -> SendOutcome {
    for queue in [outbound.chunk_queue(), outbound.general_queue()] {
        if let Some(peeked) = queue.peek() {
            if !outbound.send_queued(&peeked.frame) {
                return SendOutcome::Refused;
            }
            queue.pop_peeked(&peeked);
            return SendOutcome::Sent;
        }
    }
    SendOutcome::Empty
}

/// Spawn the supervised sender loop.
///
/// A panic inside the loop restarts it. Setting `cancel` to true ends it, and
/// so does dropping the last strong reference to `outbound`.
pub fn spawn_sender<O: Outbound>(outbound: Weak<O>, mut cancel: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let run = AssertUnwindSafe(drain(&outbound, &mut cancel))
                .catch_unwind()
                .await;

            match run {
                Ok(()) => break,
                Err(_) if is_cancelled(&cancel) || outbound.strong_count() == 0 => break,
                Err(_) => tracing::error!("Sender loop panicked; restarting"),
            }
        }
        tracing::debug!("Sender loop stopped");
    })
}

async fn drain<O: Outbound>(outbound: &Weak<O>, cancel: &mut watch::Receiver<bool>) {
    loop {
        if is_cancelled(cancel) {
            return;
        }

        // Only borrowed for one step, never across a pause
        let Some(strong) = outbound.upgrade() else {
            return;
        };

        let delay = if !strong.ready_to_send() {
            IDLE_POLL
        } else {
            match send_next(&*strong) {
                SendOutcome::Sent => SEND_YIELD,
                SendOutcome::Refused | SendOutcome::Empty => SEND_BACKOFF,
            }
        };
        drop(strong);

        if pause(cancel, delay).await {
            return;
        }
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

/// Sleep for `duration`; returns true if cancelled meanwhile
async fn pause(cancel: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        changed = cancel.changed() => changed.is_err() || is_cancelled(cancel),
    }
}
