//! Outbound send queue
//!
//! Many producers push pre-serialized frames; the single sender loop peeks,
//! sends, and pops only once the frame has left. Clearing swaps the whole
//! queue out and bumps a generation counter, so a pop that belongs to a peek
//! taken before the clear is rejected instead of dropping a fresh frame.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<String>,
    generation: u64,
}

/// A frame taken from the head of the queue without removing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peeked {
    pub generation: u64,
    pub frame: String,
}

#[derive(Debug, Default)]
pub struct SendQueue {
    state: Mutex<QueueState>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: String) {
        self.state.lock().frames.push_back(frame);
    }

    pub fn peek(&self) -> Option<Peeked> {
        let state = self.state.lock();
        state.frames.front().map(|frame| Peeked {
            generation: state.generation,
            frame: frame.clone(),
        })
    }

    /// Pop the head if the queue has not been cleared since `peeked` was taken
    pub fn pop_peeked(&self, peeked: &Peeked) -> bool {
        let mut state = self.state.lock();
        if state.generation != peeked.generation {
            return false;
        }
        state.frames.pop_front().is_some()
    }

    /// Drop every queued frame, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        std::mem::take(&mut state.frames).len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }
}
