//! Fiber references and the send path.
//!
//! A [`FiberRef`] is an opaque, cloneable capability to address a fiber:
//! report its path and locality, and deliver events into its mailbox. The
//! send path never fails toward the sender; payloads that cannot be
//! delivered are released at the reference boundary.

use crate::context::Context;
use crate::error::Result;
use crate::event::{Event, PendingEvent};
use crate::path::{Locality, Path};
use crate::promise::Promise;
use crate::runtime::control_block::{ControlBlock, LifeStatus};
use crate::runtime::system::SystemCore;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A task that runs as a fiber, in the style of a small server: a struct
/// holding its own state, driven by `run`.
///
/// Closures can be spawned directly with
/// [`SystemHandle::spawn`](crate::SystemHandle::spawn); this trait is the
/// front-end for fibers with named state and methods.
pub trait Fiber: Send + 'static {
    /// The result the fiber produces.
    type Output: Send + 'static;

    /// Executes the fiber.
    fn run(&mut self, ctx: &mut Context<'_>) -> Self::Output;
}

#[derive(Clone)]
enum RefImpl {
    Local {
        block: Arc<ControlBlock>,
        core: Arc<SystemCore>,
    },
    DeadLetter {
        path: Path,
        finished_path: Path,
        crashed_path: Path,
    },
}

/// An opaque, cloneable handle addressing one fiber.
#[derive(Clone)]
pub struct FiberRef {
    imp: RefImpl,
}

impl FiberRef {
    pub(crate) fn local(block: Arc<ControlBlock>, core: Arc<SystemCore>) -> Self {
        Self {
            imp: RefImpl::Local { block, core },
        }
    }

    /// A reference that releases everything sent to it.
    ///
    /// Returned by `spawn` while the system is shutting down.
    #[must_use]
    pub(crate) fn dead_letter() -> Self {
        Self {
            imp: RefImpl::DeadLetter {
                path: Path::unique(),
                finished_path: Path::unique(),
                crashed_path: Path::unique(),
            },
        }
    }

    /// The path of the fiber this reference addresses.
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.imp {
            RefImpl::Local { block, .. } => &block.path,
            RefImpl::DeadLetter { path, .. } => path,
        }
    }

    /// Where this reference points.
    #[must_use]
    pub fn locality(&self) -> Locality {
        match &self.imp {
            RefImpl::Local { .. } => Locality::Local,
            RefImpl::DeadLetter { .. } => Locality::DeadLetter,
        }
    }

    /// Delivers a pending event into the target's mailbox, waking the fiber
    /// if it is suspended. Never fails; dead-letter targets release the
    /// payload instead.
    pub fn send(&self, event: PendingEvent) {
        match &self.imp {
            RefImpl::Local { block, core } => {
                block.mailbox.push(event);
                let life = block.lifecycle.lock();
                if life.status == LifeStatus::Suspended {
                    core.enable(block, life);
                }
                // Running, Scheduled: the fiber will drain the mailbox at
                // its next processing point. Dead: the payload stays queued
                // until the block is dropped.
            }
            RefImpl::DeadLetter { path, .. } => {
                trace!(target_path = %path, event = %event.path(), "dead letter, releasing payload");
                drop(event);
            }
        }
    }

    /// Emits an occurrence of `event` carrying `value` at this fiber.
    pub fn emit<A: Send + 'static>(&self, event: &Event<A>, value: A) {
        self.send(PendingEvent::new(event.path().clone(), value));
    }

    /// The terminal event delivered to this fiber's parent when the entry
    /// function returns, carrying its result.
    ///
    /// The type parameter must match what the fiber's body returns.
    #[must_use]
    pub fn finished_event<T: Send + 'static>(&self) -> Event<T> {
        let path = match &self.imp {
            RefImpl::Local { block, .. } => block.finished_path.clone(),
            RefImpl::DeadLetter { finished_path, .. } => finished_path.clone(),
        };
        Event::from_path(path)
    }

    /// The terminal event delivered to this fiber's parent if the fiber
    /// crashes.
    #[must_use]
    pub fn crashed_event(&self) -> Event<()> {
        let path = match &self.imp {
            RefImpl::Local { block, .. } => block.crashed_path.clone(),
            RefImpl::DeadLetter { crashed_path, .. } => crashed_path.clone(),
        };
        Event::from_path(path)
    }
}

impl fmt::Debug for FiberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRef")
            .field("path", self.path())
            .field("locality", &self.locality())
            .finish()
    }
}

/// A fiber reference paired with the promise of the fiber's result.
pub struct FutureRef<A: Send + 'static> {
    fiber: FiberRef,
    result: Promise<A>,
}

impl<A: Send + 'static> Clone for FutureRef<A> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber.clone(),
            result: self.result.clone(),
        }
    }
}

impl<A: Clone + Send + 'static> FutureRef<A> {
    pub(crate) fn new(fiber: FiberRef, result: Promise<A>) -> Self {
        Self { fiber, result }
    }

    /// The fiber this future runs as.
    #[must_use]
    pub fn fiber_ref(&self) -> &FiberRef {
        &self.fiber
    }

    /// The promise eventually holding the fiber's result.
    #[must_use]
    pub fn result(&self) -> &Promise<A> {
        &self.result
    }

    /// Waits for the fiber's result.
    ///
    /// Returns the value the body produced, or
    /// [`FiberCrashed`](crate::ErrorKind::FiberCrashed) /
    /// [`FiberKilled`](crate::ErrorKind::FiberKilled) if it died without
    /// one.
    pub fn await_result(&self, ctx: &mut Context<'_>) -> Result<A> {
        self.result.await_result(ctx)
    }
}

impl<A: Send + 'static> fmt::Debug for FutureRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureRef")
            .field("path", self.fiber.path())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dead_letter_reports_itself() {
        let dead = FiberRef::dead_letter();
        assert_eq!(dead.locality(), Locality::DeadLetter);
    }

    #[test]
    fn dead_letter_releases_payload_immediately() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let dead = FiberRef::dead_letter();
        dead.send(PendingEvent::new(
            Path::named("ignored"),
            Counted(Arc::clone(&drops)),
        ));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminal_event_paths_are_stable_per_ref() {
        let dead = FiberRef::dead_letter();
        assert_eq!(
            dead.crashed_event().path(),
            dead.clone().crashed_event().path()
        );
        assert_ne!(dead.crashed_event().path(), dead.finished_event::<()>().path());
    }
}
