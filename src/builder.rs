//! The spawn front-end.
//!
//! A [`FiberBuilder`] configures a fiber before it starts: name, pinning,
//! stack size. Builders are consumed by the terminal `spawn`/`spawn_future`/
//! `run` call, in the same move-through style as
//! [`SystemBuilder`](crate::SystemBuilder).
//!
//! ```no_run
//! # let system = weft::FiberSystem::new().unwrap();
//! let fiber = system
//!     .fiber()
//!     .named("resolver")
//!     .stack_size(256 * 1024)
//!     .spawn(|ctx| {
//!         // ...
//!     })
//!     .expect("spawn");
//! ```

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::event::PendingEvent;
use crate::fiber::{Fiber, FiberRef, FutureRef};
use crate::path::Locality;
use crate::promise::Promise;
use crate::runtime::control_block::WorkerId;
use crate::runtime::scheduler::worker::current_worker;
use crate::runtime::system::SystemCore;
use std::sync::Arc;

/// Configures and starts a fiber.
#[derive(Debug)]
pub struct FiberBuilder {
    core: Arc<SystemCore>,
    name: Option<String>,
    pin: Option<WorkerId>,
    stack_size: usize,
}

impl FiberBuilder {
    pub(crate) fn new(core: Arc<SystemCore>) -> Self {
        let stack_size = core.config.fiber_stack_size;
        Self {
            core,
            name: None,
            pin: None,
            stack_size,
        }
    }

    /// Names the fiber. Unnamed fibers get a generated unique path.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pins the fiber to the worker running the current fiber, so every
    /// resumption happens there. A no-op when called off the worker pool.
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pin = current_worker();
        self
    }

    /// Pins the fiber to a specific worker.
    ///
    /// # Panics
    ///
    /// Panics if `worker` does not exist in this system.
    #[must_use]
    pub fn pinned_to(mut self, worker: WorkerId) -> Self {
        assert!(
            worker < self.core.workers.len(),
            "worker {worker} out of range (system has {})",
            self.core.workers.len()
        );
        self.pin = Some(worker);
        self
    }

    /// Removes any pinning; the fiber may run on (and migrate between) all
    /// workers. This is the default.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.pin = None;
        self
    }

    /// Overrides the system's default fiber stack size, in bytes.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes.max(crate::runtime::config::MIN_FIBER_STACK);
        self
    }

    /// Spawns a detached fiber running `body`.
    ///
    /// The result of `body` is delivered to the spawning fiber as the
    /// target's [`finished_event`](FiberRef::finished_event).
    pub fn spawn<F, T>(self, body: F) -> Result<FiberRef>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.core.spawn_with(
            self.name,
            self.pin,
            self.stack_size,
            None,
            body,
            |block, value| {
                if let Some(parent) = &block.parent {
                    parent.send(PendingEvent::new(block.finished_path.clone(), value));
                }
            },
        )
    }

    /// Spawns a fiber whose result is captured in a [`Promise`].
    ///
    /// If the fiber crashes or terminates cooperatively the promise is
    /// rejected instead. During shutdown the promise is rejected
    /// immediately and the fiber reference is a dead letter.
    pub fn spawn_future<F, T>(self, body: F) -> Result<FutureRef<T>>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Clone + Send + 'static,
    {
        let promise = Promise::new();
        let reject = promise.clone();
        let fulfil = promise.clone();
        let fiber = self.core.spawn_with(
            self.name,
            self.pin,
            self.stack_size,
            Some(Box::new(move |err| {
                reject.set_err(err);
            })),
            body,
            move |_block, value| {
                fulfil.set(value);
            },
        )?;
        if fiber.locality() == Locality::DeadLetter {
            promise.set_err(
                Error::new(ErrorKind::PromiseDropped).with_context("system is shutting down"),
            );
        }
        Ok(FutureRef::new(fiber, promise))
    }

    /// Runs a [`Fiber`] implementation with this configuration.
    pub fn run<FB: Fiber>(self, mut fiber: FB) -> Result<FiberRef> {
        self.spawn(move |ctx| fiber.run(ctx))
    }
}
