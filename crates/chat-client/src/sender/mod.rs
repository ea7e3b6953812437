//! Rate-limited sender
//!
//! Send budget, the two outbound queues and the loop that drains them.

mod queue;
mod rate_limit;
mod worker;

pub use queue::{Peeked, SendQueue};
pub use rate_limit::{Priority, RateLimiter, HARD_CAP, RATE_LIMIT_WINDOW, SOFT_CAP};
pub use worker::{
    send_next, spawn_sender, Outbound, SendOutcome, IDLE_POLL, SEND_BACKOFF, SEND_YIELD,
};
