//! Context-switch primitives.
//!
//! This is the one part of a fiber runtime that cannot be written in
//! portable code, so it is kept behind a narrow seam: construct a coroutine
//! on a fixed-size stack, resume it, and let the fiber hand control back
//! with a [`Switch`] reason. Everything else in the crate talks only to
//! this module's types.
//!
//! A worker never jumps directly from one fiber to another: every resume
//! enters a fiber from scheduler state, and every [`Switch`] returns through
//! the scheduler, which decides what runs next.

use crate::error::{Error, ErrorKind, Result};
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use std::fmt;

/// Why a fiber handed control back to its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Switch {
    /// Voluntary cooperative yield; reschedule on the same worker.
    Yielded,
    /// Nothing to do; suspend until a sender enables the fiber. The worker
    /// re-checks the mailbox under the lifecycle lock before committing.
    Suspended,
}

/// Panic payload used for cooperative termination.
///
/// The worker recognises this marker at the resume boundary and performs the
/// Dead transition without reporting a crash.
pub(crate) struct KillFiber;

/// The suspend handle passed into a fiber's entry function.
pub(crate) type FiberYielder = Yielder<(), Switch>;

/// A fiber's stack plus its saved machine context.
///
/// Present in the control block whenever the fiber is not running; taken out
/// by exactly one worker for the duration of a resume. Dropping a suspended
/// coroutine unwinds its stack, running any cleanup on the fiber's frames.
pub(crate) struct FiberCoroutine {
    inner: Coroutine<(), Switch, ()>,
}

// Fiber entry functions are `Send` and a suspended stack is only ever
// reached again through the ready queues, which hand exclusive ownership
// from the enabling thread to the resuming worker.
unsafe impl Send for FiberCoroutine {}

impl FiberCoroutine {
    /// Allocates a stack of `stack_bytes` and seats `entry` on it, ready for
    /// its first resume.
    pub(crate) fn new<F>(stack_bytes: usize, entry: F) -> Result<Self>
    where
        F: FnOnce(&FiberYielder) + Send + 'static,
    {
        let stack = DefaultStack::new(stack_bytes).map_err(|e| {
            Error::new(ErrorKind::StackExhausted)
                .with_context("allocating fiber stack")
                .with_source(e)
        })?;
        Ok(Self {
            inner: Coroutine::with_stack(stack, move |yielder, ()| entry(yielder)),
        })
    }

    /// Jumps into the fiber until it yields or its entry function returns.
    ///
    /// Panics raised inside the fiber propagate out of this call once the
    /// fiber's own frames have unwound; callers catch them in scheduler
    /// state.
    pub(crate) fn resume(&mut self) -> CoroutineResult<Switch, ()> {
        self.inner.resume(())
    }
}

impl fmt::Debug for FiberCoroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberCoroutine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const TEST_STACK: usize = 64 * 1024;

    #[test]
    fn runs_entry_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let mut fiber = FiberCoroutine::new(TEST_STACK, move |_yielder| {
            flag.store(true, Ordering::SeqCst);
        })
        .expect("stack allocation");

        match fiber.resume() {
            CoroutineResult::Return(()) => {}
            CoroutineResult::Yield(other) => panic!("unexpected yield: {other:?}"),
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn yields_and_resumes_in_order() {
        let steps = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&steps);
        let mut fiber = FiberCoroutine::new(TEST_STACK, move |yielder| {
            counter.store(1, Ordering::SeqCst);
            yielder.suspend(Switch::Yielded);
            counter.store(2, Ordering::SeqCst);
            yielder.suspend(Switch::Suspended);
            counter.store(3, Ordering::SeqCst);
        })
        .expect("stack allocation");

        assert!(matches!(
            fiber.resume(),
            CoroutineResult::Yield(Switch::Yielded)
        ));
        assert_eq!(steps.load(Ordering::SeqCst), 1);

        assert!(matches!(
            fiber.resume(),
            CoroutineResult::Yield(Switch::Suspended)
        ));
        assert_eq!(steps.load(Ordering::SeqCst), 2);

        assert!(matches!(fiber.resume(), CoroutineResult::Return(())));
        assert_eq!(steps.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropping_suspended_fiber_unwinds_its_stack() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let mut fiber = FiberCoroutine::new(TEST_STACK, move |yielder| {
            let _guard = SetOnDrop(flag);
            yielder.suspend(Switch::Suspended);
        })
        .expect("stack allocation");

        assert!(matches!(
            fiber.resume(),
            CoroutineResult::Yield(Switch::Suspended)
        ));
        assert!(!cleaned.load(Ordering::SeqCst));

        drop(fiber);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[test]
    fn panic_propagates_to_the_resumer() {
        let mut fiber = FiberCoroutine::new(TEST_STACK, |_yielder| {
            panic!("boom");
        })
        .expect("stack allocation");

        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fiber.resume()));
        match outcome {
            Err(payload) => assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom")),
            Ok(_) => panic!("panic should cross the resume boundary"),
        }
    }
}
