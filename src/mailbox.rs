//! Per-fiber mailbox.
//!
//! A mailbox is an unbounded multi-producer FIFO of [`PendingEvent`]s. Any
//! thread may enqueue; the single consumer is the owning fiber, which runs on
//! exactly one worker at a time. Each item is enqueued once and dequeued
//! once, and its payload is released exactly once, on the consumer side
//! (dropping an undelivered mailbox releases whatever is left in it).

use crate::event::PendingEvent;
use crossbeam_queue::SegQueue;

/// A multi-producer, single-consumer FIFO of pending events.
#[derive(Debug, Default)]
pub struct Mailbox {
    inner: SegQueue<PendingEvent>,
}

impl Mailbox {
    /// Creates a new empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Enqueues an event, transferring ownership of its payload.
    pub fn push(&self, event: PendingEvent) {
        self.inner.push(event);
    }

    /// Dequeues the oldest pending event, if any.
    #[must_use]
    pub fn pop(&self) -> Option<PendingEvent> {
        self.inner.pop()
    }

    /// Returns true if no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
