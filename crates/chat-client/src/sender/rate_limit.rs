//! Outbound send budget
//!
//! The gateway closes the socket (4008) after 120 frames in 60 seconds. Queued
//! traffic stops at a soft cap below that so heartbeats, IDENTIFY and RESUME
//! always have room left in the window.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Length of one rate limit window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Frames allowed per window, for any traffic
pub const HARD_CAP: u32 = 120;

/// Frames allowed per window for queued traffic
pub const SOFT_CAP: u32 = 115;

/// Which cap a frame is held to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Heartbeat, IDENTIFY, RESUME
    Control,
    /// Anything drained from the send queues
    Queued,
}

impl Priority {
    #[must_use]
    pub const fn cap(self) -> u32 {
        match self {
            Self::Control => HARD_CAP,
            Self::Queued => SOFT_CAP,
        }
    }
}

#[derive(Debug)]
struct Window {
    resets_at: Instant,
    sent: u32,
    /// Latched on the first refusal of a window, so the warning is logged once
    warned: bool,
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<Window>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window {
                resets_at: Instant::now() + RATE_LIMIT_WINDOW,
                sent: 0,
                warned: false,
            }),
        }
    }

    /// Start a fresh window (on every new socket)
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.resets_at = Instant::now() + RATE_LIMIT_WINDOW;
        window.sent = 0;
        window.warned = false;
    }

    /// Run `send` if the budget allows it.
    ///
    /// `send` reports whether the frame actually left; only frames that did
    /// are counted. The window lock is held across `send`, so it must not block.
    pub fn send_with<F>(&self, priority: Priority, send: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut window = self.window.lock();

        let now = Instant::now();
        if window.resets_at <= now {
            window.resets_at = now + RATE_LIMIT_WINDOW;
            window.sent = 0;
            window.warned = false;
        }

        if window.sent >= priority.cap() {
            if !window.warned {
                window.warned = true;
                tracing::warn!(
                    sent = window.sent,
                    ?priority,
                    "Hit the gateway send rate limit; holding frames until the window resets"
                );
            }
            return false;
        }

        if send() {
            window.sent += 1;
            true
        } else {
            false
        }
    }

    /// Frames counted in the current window
    pub fn sent_in_window(&self) -> u32 {
        self.window.lock().sent
    }
}
