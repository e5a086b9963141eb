//! Per-fiber control blocks.
//!
//! A control block is the runtime record for one fiber (or one fiberized OS
//! thread): its path, mailbox, life status, pinning, and the stored
//! coroutine while the fiber is not running. The lifecycle mutex guards only
//! status transitions and the coroutine slot; it is never held across a jump
//! into user code.
//!
//! Status invariants:
//!
//! - a block is on at most one worker queue at a time, and it is on a queue
//!   exactly when its status is `Scheduled`;
//! - `Scheduled → Running` is performed only by the worker that pops the
//!   block; `Suspended → Scheduled` may be performed by any sender under the
//!   lifecycle lock;
//! - the coroutine slot is occupied exactly when the status is `Suspended`
//!   or `Scheduled`.

use crate::error::Error;
use crate::mailbox::Mailbox;
use crate::path::Path;
use crate::runtime::scheduler::worker::Parker;
use crate::runtime::switch::FiberCoroutine;
use parking_lot::Mutex;

/// Identifier of a scheduler worker.
pub type WorkerId = usize;

/// Life status of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifeStatus {
    /// Waiting for a sender to enable it; not on any queue.
    Suspended,
    /// On exactly one worker's ready queue.
    Scheduled,
    /// Executing on exactly one worker (or, for a thread block, on its own
    /// OS thread).
    Running,
    /// Entry function completed or the fiber crashed; the stack is gone.
    Dead,
}

/// State guarded by the control block's lifecycle mutex.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) status: LifeStatus,
    /// The fiber's stack and saved context, present while not running.
    pub(crate) coroutine: Option<FiberCoroutine>,
    /// Worker this fiber is pinned to, if any. Pinned fibers travel only
    /// through their worker's inbox and are never stolen.
    pub(crate) pinned: Option<WorkerId>,
}

/// How a control block is resumed.
#[derive(Debug)]
pub(crate) enum BlockBody {
    /// A fiber driven by the worker pool.
    Fiber,
    /// A fiberized OS thread: no coroutine, suspension blocks the thread on
    /// this parker and `enable` signals it.
    Thread(Parker),
}

/// Callback invoked when a fiber dies without producing a result, used to
/// reject the promise of a future fiber.
pub(crate) type FailureHook = Box<dyn FnOnce(Error) + Send>;

/// The per-fiber runtime record.
pub(crate) struct ControlBlock {
    /// Path identifying this fiber.
    pub(crate) path: Path,
    /// Incoming events, multi-producer, consumed only by the owning fiber.
    pub(crate) mailbox: Mailbox,
    /// Status, stored coroutine, and pinning, under a short-held mutex.
    pub(crate) lifecycle: Mutex<Lifecycle>,
    /// Fiber or fiberized-thread behavior.
    pub(crate) body: BlockBody,
    /// Receiver of this fiber's terminal events.
    pub(crate) parent: Option<crate::fiber::FiberRef>,
    /// Path of the terminal event carrying the entry function's result.
    pub(crate) finished_path: Path,
    /// Path of the terminal event emitted if the fiber crashes.
    pub(crate) crashed_path: Path,
    /// Rejection hook for future fibers.
    pub(crate) failure_hook: Mutex<Option<FailureHook>>,
}

impl ControlBlock {
    /// Creates the record for a new fiber, ready to be placed on a queue.
    pub(crate) fn new_fiber(
        path: Path,
        pinned: Option<WorkerId>,
        parent: Option<crate::fiber::FiberRef>,
    ) -> Self {
        Self {
            path,
            mailbox: Mailbox::new(),
            lifecycle: Mutex::new(Lifecycle {
                status: LifeStatus::Scheduled,
                coroutine: None,
                pinned,
            }),
            body: BlockBody::Fiber,
            parent,
            finished_path: Path::unique(),
            crashed_path: Path::unique(),
            failure_hook: Mutex::new(None),
        }
    }

    /// Creates the record for a fiberized OS thread.
    ///
    /// The thread is considered `Running` from the start; it suspends itself
    /// through its parker when it has drained its mailbox.
    pub(crate) fn new_thread(path: Path) -> Self {
        Self {
            path,
            mailbox: Mailbox::new(),
            lifecycle: Mutex::new(Lifecycle {
                status: LifeStatus::Running,
                coroutine: None,
                pinned: None,
            }),
            body: BlockBody::Thread(Parker::new()),
            parent: None,
            finished_path: Path::unique(),
            crashed_path: Path::unique(),
            failure_hook: Mutex::new(None),
        }
    }

    /// The parker of a thread-bodied block.
    pub(crate) fn thread_parker(&self) -> Option<&Parker> {
        match &self.body {
            BlockBody::Thread(parker) => Some(parker),
            BlockBody::Fiber => None,
        }
    }
}

impl std::fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBlock")
            .field("path", &self.path)
            .field("pending_events", &self.mailbox.len())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
