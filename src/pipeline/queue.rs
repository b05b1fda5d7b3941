//! Shared queue of page indices still waiting for a worker.

use crate::transform::PageIndex;
use parking_lot::Mutex;
use std::ops::Range;

/// Remaining indices `[next, end)`, handed out smallest-first.
///
/// `pop` is the only synchronisation point between workers that are
/// looking for work; no index is ever handed out twice and the queue is
/// never refilled.
#[derive(Debug)]
pub struct WorkQueue {
    remaining: Mutex<Range<PageIndex>>,
}

impl WorkQueue {
    /// Queue holding `1..=total`.
    pub fn new(total: usize) -> Self {
        Self {
            remaining: Mutex::new(1..total + 1),
        }
    }

    /// Take the smallest remaining index, or `None` once drained.
    pub fn pop(&self) -> Option<PageIndex> {
        self.remaining.lock().next()
    }

    /// Drop every queued index so idle workers exit. Returns how many were cancelled.
    pub fn close(&self) -> usize {
        let mut remaining = self.remaining.lock();
        let cancelled = remaining.len();
        remaining.start = remaining.end;
        cancelled
    }
}
