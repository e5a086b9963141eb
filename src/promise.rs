//! Write-once result cells.
//!
//! A [`Promise`] carries the result of a future fiber to whoever awaits it.
//! Completion is sticky: the first `set`/`set_err` wins and later calls are
//! ignored. Fibers awaiting a pending promise register themselves and are
//! woken through their own mailbox when the result lands; awaiting an
//! already-completed promise returns immediately.

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::event::{Event, PendingEvent};
use crate::fiber::FiberRef;
use crate::path::Path;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct Waiter {
    target: FiberRef,
    path: Path,
}

enum PromiseState<A: Send + 'static> {
    Pending(Vec<Waiter>),
    Ready(Result<A>),
}

struct PromiseShared<A: Send + 'static> {
    state: Mutex<PromiseState<A>>,
}

impl<A: Clone + Send + 'static> PromiseShared<A> {
    fn complete(&self, result: Result<A>) -> bool {
        let waiters = {
            let mut state = self.state.lock();
            match &mut *state {
                PromiseState::Ready(_) => return false,
                PromiseState::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = PromiseState::Ready(result.clone());
                    waiters
                }
            }
        };
        for waiter in waiters {
            waiter
                .target
                .send(PendingEvent::new(waiter.path, result.clone()));
        }
        true
    }
}

impl<A: Send + 'static> Drop for PromiseShared<A> {
    fn drop(&mut self) {
        // Nobody can complete this promise any more; wake the waiters with
        // an error rather than leaving them suspended forever.
        if let PromiseState::Pending(waiters) = &mut *self.state.lock() {
            for waiter in waiters.drain(..) {
                let dropped: Result<A> = Err(Error::new(ErrorKind::PromiseDropped));
                waiter
                    .target
                    .send(PendingEvent::new(waiter.path, dropped));
            }
        }
    }
}

/// A cloneable, write-once cell holding the eventual result of a fiber.
pub struct Promise<A: Send + 'static> {
    shared: Arc<PromiseShared<A>>,
}

impl<A: Send + 'static> Clone for Promise<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Clone + Send + 'static> Promise<A> {
    /// Creates an empty promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PromiseShared {
                state: Mutex::new(PromiseState::Pending(Vec::new())),
            }),
        }
    }

    /// Fulfils the promise. Returns false if it was already completed.
    pub fn set(&self, value: A) -> bool {
        self.shared.complete(Ok(value))
    }

    /// Rejects the promise. Returns false if it was already completed.
    pub fn set_err(&self, error: Error) -> bool {
        self.shared.complete(Err(error))
    }

    /// The result, if the promise has been completed.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<A>> {
        match &*self.shared.state.lock() {
            PromiseState::Ready(result) => Some(result.clone()),
            PromiseState::Pending(_) => None,
        }
    }

    /// Waits until the promise is completed and returns its result.
    pub fn await_result(&self, ctx: &mut Context<'_>) -> Result<A> {
        let wake_path = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                PromiseState::Ready(result) => return result.clone(),
                PromiseState::Pending(waiters) => {
                    let path = Path::unique();
                    waiters.push(Waiter {
                        target: ctx.self_ref(),
                        path: path.clone(),
                    });
                    path
                }
            }
        };
        Event::<Result<A>>::from_path(wake_path).await_next(ctx)
    }
}

impl<A: Clone + Send + 'static> Default for Promise<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Send + 'static> fmt::Debug for Promise<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock() {
            PromiseState::Pending(waiters) => format!("Pending({} waiters)", waiters.len()),
            PromiseState::Ready(Ok(_)) => "Ready(Ok)".to_owned(),
            PromiseState::Ready(Err(e)) => format!("Ready(Err({e}))"),
        };
        f.debug_tuple("Promise").field(&state).finish()
    }
}
