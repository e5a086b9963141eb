//! Cross-thread ready queue of one worker.
//!
//! Any thread may enable a fiber onto any worker, but a worker's stealable
//! deque can only be pushed to by its owner. The inbox bridges the gap: a
//! thread-safe unbounded FIFO that senders push enabled blocks into and only
//! the owning worker pops. Pinned fibers travel exclusively through their
//! worker's inbox, which thieves never touch.

use crate::runtime::control_block::ControlBlock;
use crossbeam_queue::SegQueue;
use std::sync::Arc;

/// A worker's cross-thread ready queue.
#[derive(Debug, Default)]
pub(crate) struct Inbox {
    inner: SegQueue<Arc<ControlBlock>>,
}

impl Inbox {
    /// Creates a new empty inbox.
    pub(crate) fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes an enabled block; callable from any thread.
    pub(crate) fn push(&self, block: Arc<ControlBlock>) {
        self.inner.push(block);
    }

    /// Pops the oldest enabled block; called only by the owning worker.
    pub(crate) fn pop(&self) -> Option<Arc<ControlBlock>> {
        self.inner.pop()
    }

    /// Returns true if no blocks are waiting.
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
