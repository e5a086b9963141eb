//! Per-fiber event dispatch.
//!
//! A [`Context`] is the dispatch state of one fiber (or of the fiberized
//! main thread): the table mapping event paths to stacks of handlers, the
//! frames of dispatches currently in flight, and the suspend mechanism used
//! when the mailbox runs dry. It only ever exists on the thread currently
//! running its fiber, so none of this state needs locking.
//!
//! Handlers for one path form a stack: the newest binding runs first and
//! may delegate to the one below it with [`Context::super_call`]. Destroyed
//! handlers are skipped during dispatch, pruned from the tail before it,
//! and swept afterwards, so churn in the middle of a long-lived stack does
//! not accumulate.

use crate::event::PendingEvent;
use crate::fiber::FiberRef;
use crate::path::Path;
use crate::runtime::control_block::{ControlBlock, LifeStatus, WorkerId};
use crate::runtime::scheduler::worker::{current_worker, Parker};
use crate::runtime::switch::{FiberYielder, KillFiber, Switch};
use crate::runtime::system::SystemHandle;
use smallvec::SmallVec;
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

/// A type-erased handler: receives the dispatching context and the event
/// payload.
pub(crate) type ErasedHandler = Box<dyn Fn(&mut Context<'_>, &dyn Any)>;

/// One binding in a handler stack.
pub(crate) struct HandlerEntry {
    destroyed: Cell<bool>,
    run: ErasedHandler,
}

/// The ordered stack of handlers bound to one path. Newer bindings sit at
/// the back and run first.
#[derive(Default)]
struct HandlerBlock {
    entries: SmallVec<[Rc<HandlerEntry>; 2]>,
}

/// One in-flight dispatch: which handler stack, how far down it the cursor
/// has moved, and the payload being delivered.
struct HandlerFrame {
    block: Rc<std::cell::RefCell<HandlerBlock>>,
    /// `None` until the first `super_call` of the dispatch; then the index
    /// of the handler currently executing.
    cursor: Cell<Option<usize>>,
    payload: Rc<dyn Any>,
}

/// Owner handle for a bound handler.
///
/// Dropping the ref destroys the binding: the handler is skipped from then
/// on and reclaimed lazily by dispatch. Call [`detach`](Self::detach) to
/// keep the handler bound for the life of the fiber instead.
pub struct HandlerRef {
    entry: Rc<HandlerEntry>,
    armed: bool,
}

impl HandlerRef {
    /// Destroys the binding now. Equivalent to dropping the ref.
    pub fn destroy(self) {
        drop(self);
    }

    /// Consumes the ref, leaving the handler bound permanently.
    pub fn detach(mut self) {
        self.armed = false;
    }

    /// True if the binding has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.entry.destroyed.get()
    }
}

impl Drop for HandlerRef {
    fn drop(&mut self) {
        if self.armed {
            self.entry.destroyed.set(true);
        }
    }
}

impl std::fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRef")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// How the context hands control back when its mailbox is drained.
enum Suspender<'s> {
    /// A fiber on the worker pool: jump back to scheduler state.
    Worker(&'s FiberYielder),
    /// A fiberized OS thread: block on the control block's parker.
    Thread(Parker),
}

/// The event-dispatch context of one fiber.
///
/// Fibers receive `&mut Context` in their entry function; the fiberized
/// main thread obtains one from
/// [`FiberSystem::main_context`](crate::FiberSystem::main_context).
pub struct Context<'s> {
    system: SystemHandle,
    block: Arc<ControlBlock>,
    suspender: Suspender<'s>,
    handlers: HashMap<Path, Rc<std::cell::RefCell<HandlerBlock>>>,
    frames: Vec<HandlerFrame>,
}

impl<'s> Context<'s> {
    pub(crate) fn for_fiber(
        system: SystemHandle,
        block: Arc<ControlBlock>,
        yielder: &'s FiberYielder,
    ) -> Self {
        Self {
            system,
            block,
            suspender: Suspender::Worker(yielder),
            handlers: HashMap::new(),
            frames: Vec::new(),
        }
    }

    pub(crate) fn for_thread(system: SystemHandle, block: Arc<ControlBlock>) -> Context<'static> {
        let parker = block
            .thread_parker()
            .expect("thread context requires a thread-bodied block")
            .clone();
        Context {
            system,
            block,
            suspender: Suspender::Thread(parker),
            handlers: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// The system this fiber belongs to.
    #[must_use]
    pub fn system(&self) -> &SystemHandle {
        &self.system
    }

    /// A reference to the current fiber.
    #[must_use]
    pub fn self_ref(&self) -> FiberRef {
        FiberRef::local(Arc::clone(&self.block), Arc::clone(self.system.core()))
    }

    /// The path of the current fiber.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.block.path
    }

    /// The worker currently executing this fiber, or `None` on a fiberized
    /// thread.
    #[must_use]
    pub fn worker(&self) -> Option<WorkerId> {
        current_worker()
    }

    /// Registers a handler at the top of the stack for `path`.
    pub(crate) fn bind_erased(&mut self, path: Path, run: ErasedHandler) -> HandlerRef {
        let entry = Rc::new(HandlerEntry {
            destroyed: Cell::new(false),
            run,
        });
        self.handlers
            .entry(path)
            .or_default()
            .borrow_mut()
            .entries
            .push(Rc::clone(&entry));
        HandlerRef { entry, armed: true }
    }

    /// Delegates to the next-most-recent live handler for the event being
    /// dispatched.
    ///
    /// The first call within a dispatch runs the newest handler; each
    /// further call moves toward the oldest, skipping destroyed bindings,
    /// and executes at most one handler. At the bottom of the stack this is
    /// a no-op. Outside a dispatch it is a no-op as well.
    pub fn super_call(&mut self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let block = Rc::clone(&frame.block);
        let payload = Rc::clone(&frame.payload);
        let cursor = frame.cursor.get();

        let next = {
            let stack = block.borrow();
            let mut index = cursor.unwrap_or(stack.entries.len());
            loop {
                if index == 0 {
                    break None;
                }
                index -= 1;
                let entry = &stack.entries[index];
                if !entry.destroyed.get() {
                    break Some((index, Rc::clone(entry)));
                }
            }
        };

        let Some((index, entry)) = next else {
            return;
        };
        if let Some(frame) = self.frames.last() {
            frame.cursor.set(Some(index));
        }
        (entry.run)(self, payload.as_ref());
    }

    /// Dispatches one event to the handler stack for its path.
    ///
    /// Events without a handler block are dropped; their payload is
    /// released here.
    pub(crate) fn handle_event(&mut self, event: PendingEvent) {
        let (path, payload) = event.into_parts();
        let Some(block) = self.handlers.get(&path).map(Rc::clone) else {
            trace!(fiber = %self.block.path, event = %path, "no handler, dropping event");
            return;
        };

        {
            let mut stack = block.borrow_mut();
            while stack.entries.last().is_some_and(|e| e.destroyed.get()) {
                stack.entries.pop();
            }
            if stack.entries.is_empty() {
                drop(stack);
                self.handlers.remove(&path);
                return;
            }
        }

        let payload: Box<dyn Any> = payload;
        self.frames.push(HandlerFrame {
            block,
            cursor: Cell::new(None),
            payload: Rc::from(payload),
        });
        self.super_call();
        let frame = self.frames.pop().expect("handler frame stack corrupted");

        // Sweep destroyed bindings once no cursor can be pointing at them.
        let mut stack = frame.block.borrow_mut();
        if stack.entries.iter().any(|e| e.destroyed.get()) {
            stack.entries.retain(|e| !e.destroyed.get());
        }
        let empty = stack.entries.is_empty();
        drop(stack);
        if empty {
            self.handlers.remove(&path);
        }
    }

    /// Processes all pending events, then returns.
    pub fn process(&mut self) {
        while let Some(event) = self.block.mailbox.pop() {
            self.handle_event(event);
        }
    }

    /// Processes events in a loop, forever, suspending whenever the mailbox
    /// runs dry.
    pub fn process_forever(&mut self) -> ! {
        loop {
            match self.block.mailbox.pop() {
                Some(event) => self.handle_event(event),
                None => self.suspend_once(),
            }
        }
    }

    /// Voluntarily reschedules this fiber, letting its worker run other
    /// ready fibers first. On a fiberized thread this yields the OS thread.
    pub fn yield_now(&mut self) {
        match &self.suspender {
            Suspender::Worker(yielder) => {
                yielder.suspend(Switch::Yielded);
            }
            Suspender::Thread(_) => std::thread::yield_now(),
        }
    }

    /// Terminates the current fiber without reporting a crash.
    ///
    /// The fiber's stack unwinds, running cleanup on the way out; a future
    /// fiber's promise is rejected with
    /// [`FiberKilled`](crate::ErrorKind::FiberKilled). Must be called from a
    /// fiber, not from a fiberized thread.
    pub fn terminate(&mut self) -> ! {
        std::panic::panic_any(KillFiber)
    }

    /// Handles events until `ready` reports true, suspending whenever the
    /// mailbox runs dry. Events queued behind the one that satisfied the
    /// predicate stay in the mailbox.
    pub(crate) fn yield_until(&mut self, ready: &dyn Fn() -> bool) {
        loop {
            if ready() {
                return;
            }
            match self.block.mailbox.pop() {
                Some(event) => self.handle_event(event),
                None => self.suspend_once(),
            }
        }
    }

    /// Suspends until a sender enables this fiber.
    ///
    /// On a worker the jump hands the saved context back to the scheduler,
    /// which re-checks the mailbox under the lifecycle lock before
    /// committing the suspension. On a fiberized thread the same
    /// double-check runs here, then the thread parks.
    fn suspend_once(&mut self) {
        match &self.suspender {
            Suspender::Worker(yielder) => {
                yielder.suspend(Switch::Suspended);
            }
            Suspender::Thread(parker) => {
                {
                    let mut life = self.block.lifecycle.lock();
                    if !self.block.mailbox.is_empty() {
                        // A send raced in between the drain and the lock.
                        return;
                    }
                    life.status = LifeStatus::Suspended;
                }
                parker.park();
                let mut life = self.block.lifecycle.lock();
                debug_assert_eq!(life.status, LifeStatus::Scheduled);
                life.status = LifeStatus::Running;
            }
        }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("fiber", &self.block.path)
            .field("handler_paths", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
