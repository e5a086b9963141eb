//! Worker thread logic.
//!
//! Each worker owns a stealable deque plus a cross-thread inbox and runs the
//! loop: pop own work, steal from a sibling, or park briefly. A worker is
//! always either in scheduler state or inside exactly one fiber; every
//! transition between fibers goes through the scheduler state in between.

use crate::error::{Error, ErrorKind};
use crate::event::PendingEvent;
use crate::runtime::control_block::{ControlBlock, LifeStatus, WorkerId};
use crate::runtime::scheduler::inbox::Inbox;
use crate::runtime::scheduler::stealing;
use crate::runtime::switch::{KillFiber, Switch};
use crate::runtime::system::SystemCore;
use crate::util::XorShift64;
use corosensei::CoroutineResult;
use crossbeam_deque::{Stealer, Worker as Deque};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// The slice of a worker visible to other threads: where to enqueue enabled
/// blocks, how to wake the worker, and where thieves steal from.
#[derive(Debug)]
pub(crate) struct WorkerShared {
    /// Ready queue reachable from any thread.
    pub(crate) inbox: Inbox,
    /// Wakes the worker when work arrives.
    pub(crate) parker: Parker,
    /// Steal handle onto the worker's deque.
    pub(crate) stealer: Stealer<Arc<ControlBlock>>,
}

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
    static CURRENT_FIBER: RefCell<Option<Arc<ControlBlock>>> = const { RefCell::new(None) };
}

/// The worker id of the current thread, if it is a scheduler worker.
pub(crate) fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(Cell::get)
}

/// The control block being executed on the current thread, if any.
pub(crate) fn current_fiber() -> Option<Arc<ControlBlock>> {
    CURRENT_FIBER.with(|fiber| fiber.borrow().clone())
}

/// A worker thread that executes fibers.
pub(crate) struct Worker {
    id: WorkerId,
    /// Owner end of the stealable deque.
    queue: Deque<Arc<ControlBlock>>,
    core: Arc<SystemCore>,
    /// Seeded once; drives steal-victim selection.
    rng: XorShift64,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        queue: Deque<Arc<ControlBlock>>,
        core: Arc<SystemCore>,
    ) -> Self {
        Self {
            id,
            queue,
            core,
            rng: XorShift64::from_entropy(),
        }
    }

    /// Runs the scheduling loop until the system stops the workers.
    pub(crate) fn run(mut self) {
        CURRENT_WORKER.with(|worker| worker.set(Some(self.id)));
        trace!(worker = self.id, "worker started");

        while !self.core.stop_workers.load(Ordering::Acquire) {
            if let Some(block) = self.next_block() {
                self.run_block(block);
            } else {
                self.core.workers[self.id]
                    .parker
                    .park_timeout(self.core.config.park_timeout);
            }
        }

        trace!(worker = self.id, "worker stopped");
    }

    /// Picks the next runnable block: inbox first (enables and pinned
    /// work), then own deque, then a steal probe.
    fn next_block(&mut self) -> Option<Arc<ControlBlock>> {
        let shared = &self.core.workers[self.id];
        if let Some(block) = shared.inbox.pop() {
            return Some(block);
        }
        if let Some(block) = self.queue.pop() {
            return Some(block);
        }
        stealing::steal_block(&self.core.workers, self.id, &mut self.rng)
    }

    /// Resumes one block and commits whatever transition it yields.
    fn run_block(&mut self, block: Arc<ControlBlock>) {
        let mut coroutine = {
            let mut life = block.lifecycle.lock();
            debug_assert_eq!(life.status, LifeStatus::Scheduled);
            debug_assert!(
                life.pinned.is_none() || life.pinned == Some(self.id),
                "pinned fiber popped by the wrong worker"
            );
            life.status = LifeStatus::Running;
            life.coroutine
                .take()
                .expect("scheduled fiber has no stored coroutine")
        };

        trace!(worker = self.id, fiber = %block.path, "resuming fiber");
        CURRENT_FIBER.with(|fiber| *fiber.borrow_mut() = Some(Arc::clone(&block)));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| coroutine.resume()));
        CURRENT_FIBER.with(|fiber| fiber.borrow_mut().take());

        match outcome {
            Ok(CoroutineResult::Yield(Switch::Yielded)) => {
                let pinned = {
                    let mut life = block.lifecycle.lock();
                    life.coroutine = Some(coroutine);
                    life.status = LifeStatus::Scheduled;
                    life.pinned.is_some()
                };
                self.requeue(block, pinned);
            }
            Ok(CoroutineResult::Yield(Switch::Suspended)) => {
                // Authoritative half of the yield double-check. The fiber
                // context is fully saved at this point, so decide under the
                // lifecycle lock whether a send raced in after the fiber
                // drained its mailbox.
                let requeue_pinned = {
                    let mut life = block.lifecycle.lock();
                    life.coroutine = Some(coroutine);
                    if block.mailbox.is_empty() {
                        life.status = LifeStatus::Suspended;
                        drop(life);
                        trace!(worker = self.id, fiber = %block.path, "fiber suspended");
                        return;
                    }
                    life.status = LifeStatus::Scheduled;
                    life.pinned.is_some()
                };
                self.requeue(block, requeue_pinned);
            }
            Ok(CoroutineResult::Return(())) => {
                drop(coroutine);
                self.finish(&block, None);
            }
            Err(payload) => {
                drop(coroutine);
                if payload.downcast_ref::<KillFiber>().is_some() {
                    self.finish(&block, Some(Error::new(ErrorKind::FiberKilled)));
                } else {
                    self.finish(&block, Some(Error::crashed(panic_message(payload.as_ref()))));
                }
            }
        }
    }

    /// Puts a still-live block back on this worker's ready queue.
    ///
    /// Pinned fibers go through the inbox so thieves cannot move them.
    fn requeue(&self, block: Arc<ControlBlock>, pinned: bool) {
        if pinned {
            self.core.workers[self.id].inbox.push(block);
        } else {
            self.queue.push(block);
        }
    }

    /// Performs the Dead transition: the stack is already reclaimed, the
    /// parent learns about a crash, a future's promise is rejected, and the
    /// running-fiber count drops.
    fn finish(&self, block: &Arc<ControlBlock>, failure: Option<Error>) {
        {
            let mut life = block.lifecycle.lock();
            life.status = LifeStatus::Dead;
            life.coroutine = None;
        }
        let hook = block.failure_hook.lock().take();
        match failure {
            Some(err) => {
                if err.is_crash() {
                    debug!(fiber = %block.path, error = %err, "fiber crashed");
                    if let Some(parent) = &block.parent {
                        parent.send(PendingEvent::new(block.crashed_path.clone(), ()));
                    }
                } else {
                    trace!(fiber = %block.path, "fiber terminated");
                }
                if let Some(hook) = hook {
                    hook(err);
                }
            }
            None => {
                trace!(worker = self.id, fiber = %block.path, "fiber finished");
            }
        }
        self.core.fiber_finished();
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "fiber panicked".to_owned()
    }
}

/// A mechanism for parking and unparking a thread.
///
/// Used both for idle workers waiting for work and for fiberized OS threads
/// waiting to be enabled. The flag makes an unpark that arrives before the
/// park stick, so no wakeup is ever lost.
#[derive(Debug, Clone, Default)]
pub(crate) struct Parker {
    inner: Arc<ParkerInner>,
}

#[derive(Debug, Default)]
struct ParkerInner {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    /// Creates a new parker.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks the current thread until notified.
    pub(crate) fn park(&self) {
        let mut notified = self.inner.notified.lock();
        while !*notified {
            self.inner.condvar.wait(&mut notified);
        }
        *notified = false;
    }

    /// Parks the current thread until notified or the timeout elapses.
    pub(crate) fn park_timeout(&self, timeout: Duration) {
        let mut notified = self.inner.notified.lock();
        if !*notified {
            let _ = self.inner.condvar.wait_for(&mut notified, timeout);
        }
        *notified = false;
    }

    /// Unparks a parked thread (or makes the next park return immediately).
    pub(crate) fn unpark(&self) {
        {
            let mut notified = self.inner.notified.lock();
            *notified = true;
        }
        self.inner.condvar.notify_one();
    }
}
