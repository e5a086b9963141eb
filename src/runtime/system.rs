//! System lifecycle: worker startup, fiber spawning, the running-fiber
//! count, and shutdown.
//!
//! A [`FiberSystem`] owns the worker threads. Cloneable [`SystemHandle`]s
//! reach the same system from fibers and foreign threads. The launching
//! thread becomes a fiber itself through [`FiberSystem::main_context`],
//! which is where `all_fibers_finished` is delivered when the running count
//! drains to zero.

use crate::builder::FiberBuilder;
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::event::Event;
use crate::fiber::{Fiber, FiberRef, FutureRef};
use crate::path::Path;
use crate::runtime::config::SystemConfig;
use crate::runtime::control_block::{BlockBody, ControlBlock, Lifecycle, LifeStatus, WorkerId};
use crate::runtime::scheduler::inbox::Inbox;
use crate::runtime::scheduler::worker::{current_fiber, Parker, Worker, WorkerShared};
use crate::runtime::switch::FiberCoroutine;
use crate::util::rng::with_thread_rng;
use crossbeam_deque::Worker as Deque;
use parking_lot::MutexGuard;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

/// Process-unique identity of a running system.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(u128);

impl SystemId {
    fn generate() -> Self {
        let mut bytes = [0u8; 16];
        let _ = getrandom::getrandom(&mut bytes);
        Self(u128::from_le_bytes(bytes))
    }

    /// The raw 128-bit value.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({:032x})", self.0)
    }
}

/// Shared state of a running system.
pub(crate) struct SystemCore {
    pub(crate) config: SystemConfig,
    pub(crate) workers: Vec<WorkerShared>,
    /// Refuses new fibers once set; workers keep draining.
    pub(crate) shutting_down: AtomicBool,
    /// Stops the worker loops; set only during teardown.
    pub(crate) stop_workers: AtomicBool,
    /// Number of fibers spawned and not yet dead.
    pub(crate) running: AtomicU64,
    /// Latch ensuring `all_fibers_finished` fires once per lifetime.
    finished_emitted: AtomicBool,
    /// Round-robin cursor for initial fiber placement.
    round_robin: AtomicU64,
    pub(crate) id: SystemId,
    pub(crate) all_fibers_finished: Event<()>,
    /// Control block of the fiberized launching thread.
    pub(crate) main_block: Arc<ControlBlock>,
    main_context_taken: AtomicBool,
}

impl SystemCore {
    /// A reference to the main fiber.
    pub(crate) fn main_ref(self: &Arc<Self>) -> FiberRef {
        FiberRef::local(Arc::clone(&self.main_block), Arc::clone(self))
    }

    /// Transitions a suspended block to `Scheduled` and hands it to a
    /// worker (or signals the fiberized thread). Called with the lifecycle
    /// lock held; the lock is released once the block is placed.
    pub(crate) fn enable(
        self: &Arc<Self>,
        block: &Arc<ControlBlock>,
        mut life: MutexGuard<'_, Lifecycle>,
    ) {
        debug_assert_eq!(life.status, LifeStatus::Suspended);
        life.status = LifeStatus::Scheduled;
        match &block.body {
            BlockBody::Fiber => {
                let target = life
                    .pinned
                    .unwrap_or_else(|| with_thread_rng(|rng| rng.next_usize(self.workers.len())));
                self.workers[target].inbox.push(Arc::clone(block));
                drop(life);
                trace!(fiber = %block.path, worker = target, "fiber enabled");
                self.workers[target].parker.unpark();
            }
            BlockBody::Thread(parker) => {
                let parker = parker.clone();
                drop(life);
                trace!(fiber = %block.path, "thread fiber enabled");
                parker.unpark();
            }
        }
    }

    /// Places a freshly spawned block on a worker's ready queue.
    fn place(&self, block: Arc<ControlBlock>, target: WorkerId) {
        self.workers[target].inbox.push(block);
        self.workers[target].parker.unpark();
    }

    fn next_round_robin(&self) -> WorkerId {
        let n = self.workers.len() as u64;
        (self.round_robin.fetch_add(1, Ordering::Relaxed) % n) as WorkerId
    }

    /// Decrements the running count; on the drop from 1 to 0 emits
    /// `all_fibers_finished` to the main fiber, once per system lifetime.
    pub(crate) fn fiber_finished(self: &Arc<Self>) {
        if self.running.fetch_sub(1, Ordering::AcqRel) == 1
            && !self.finished_emitted.swap(true, Ordering::AcqRel)
        {
            debug!("all fibers finished");
            self.main_ref().emit(&self.all_fibers_finished, ());
        }
    }

    /// Creates, seats, and places a new fiber.
    ///
    /// Returns a dead-letter reference while the system is shutting down.
    /// The `complete` callback runs in the fiber once the body returns,
    /// with the control block at hand for terminal-event delivery.
    pub(crate) fn spawn_with<T, F, C>(
        self: &Arc<Self>,
        name: Option<String>,
        pinned: Option<WorkerId>,
        stack_size: usize,
        failure_hook: Option<Box<dyn FnOnce(Error) + Send>>,
        body: F,
        complete: C,
    ) -> Result<FiberRef>
    where
        T: Send + 'static,
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        C: FnOnce(&ControlBlock, T) + Send + 'static,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return Ok(FiberRef::dead_letter());
        }

        let path = name.map_or_else(Path::unique, Path::named);
        let parent = current_fiber().map_or_else(
            || self.main_ref(),
            |block| FiberRef::local(block, Arc::clone(self)),
        );

        let block = Arc::new(ControlBlock::new_fiber(path, pinned, Some(parent)));
        *block.failure_hook.lock() = failure_hook;

        let handle = SystemHandle {
            core: Arc::clone(self),
        };
        let entry_block = Arc::clone(&block);
        let coroutine = FiberCoroutine::new(stack_size, move |yielder| {
            let mut ctx = Context::for_fiber(handle, Arc::clone(&entry_block), yielder);
            let value = body(&mut ctx);
            drop(ctx);
            complete(&entry_block, value);
        })?;
        block.lifecycle.lock().coroutine = Some(coroutine);

        // Counted before the block is visible to any worker, so the running
        // count cannot touch zero between spawn and first resume.
        self.running.fetch_add(1, Ordering::AcqRel);

        let target = pinned.unwrap_or_else(|| self.next_round_robin());
        trace!(fiber = %block.path, worker = target, "fiber spawned");
        self.place(Arc::clone(&block), target);
        Ok(FiberRef::local(block, Arc::clone(self)))
    }
}

impl fmt::Debug for SystemCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCore")
            .field("id", &self.id)
            .field("workers", &self.workers.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A cloneable handle onto a running system.
///
/// Handles are cheap to clone and usable from fibers, workers, and foreign
/// threads alike.
#[derive(Debug, Clone)]
pub struct SystemHandle {
    core: Arc<SystemCore>,
}

impl SystemHandle {
    pub(crate) fn from_core(core: Arc<SystemCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<SystemCore> {
        &self.core
    }

    /// Starts configuring a fiber before spawning it.
    #[must_use]
    pub fn fiber(&self) -> FiberBuilder {
        FiberBuilder::new(Arc::clone(&self.core))
    }

    /// Spawns a detached fiber running `body`.
    ///
    /// The result of `body` is delivered to the spawning fiber as a
    /// terminal event (see [`FiberRef::finished_event`]). While the system
    /// is shutting down the returned reference is a dead letter.
    pub fn spawn<F, T>(&self, body: F) -> Result<FiberRef>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.fiber().spawn(body)
    }

    /// Spawns a fiber whose result is captured in a [`Promise`](crate::Promise).
    pub fn spawn_future<F, T>(&self, body: F) -> Result<FutureRef<T>>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.fiber().spawn_future(body)
    }

    /// Runs a [`Fiber`] implementation as a new fiber.
    pub fn run<FB: Fiber>(&self, fiber: FB) -> Result<FiberRef> {
        self.fiber().run(fiber)
    }

    /// A reference to the fiberized launching thread.
    #[must_use]
    pub fn main_fiber(&self) -> FiberRef {
        self.core.main_ref()
    }

    /// The event emitted to the main fiber when the running-fiber count
    /// drains to zero. Fires at most once per system lifetime.
    #[must_use]
    pub fn all_fibers_finished(&self) -> Event<()> {
        self.core.all_fibers_finished.clone()
    }

    /// Stops accepting new fibers. Already-running fibers keep going.
    pub fn shutdown(&self) {
        debug!(system = %self.core.id, "system shutting down");
        self.core.shutting_down.store(true, Ordering::Release);
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.core.shutting_down.load(Ordering::Acquire)
    }

    /// Number of fibers spawned and not yet dead.
    #[must_use]
    pub fn running_fibers(&self) -> u64 {
        self.core.running.load(Ordering::Acquire)
    }

    /// This system's process-unique identity.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.core.id
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.core.workers.len()
    }
}

/// A running fiber system; owns the worker threads.
///
/// Dropping the system stops the workers and joins them. Fibers still
/// suspended at that point are unwound as their stacks are reclaimed.
#[derive(Debug)]
pub struct FiberSystem {
    handle: SystemHandle,
    threads: Vec<JoinHandle<()>>,
}

impl FiberSystem {
    /// Starts a system with a worker per available core.
    pub fn new() -> Result<Self> {
        crate::SystemBuilder::new().build()
    }

    /// Starts a system with the given number of workers.
    pub fn with_workers(workers: usize) -> Result<Self> {
        crate::SystemBuilder::new().workers(workers).build()
    }

    pub(crate) fn start(mut config: SystemConfig) -> Result<Self> {
        config.normalize();

        let mut queues = Vec::with_capacity(config.worker_threads);
        let mut shared = Vec::with_capacity(config.worker_threads);
        for _ in 0..config.worker_threads {
            let queue: Deque<Arc<ControlBlock>> = Deque::new_lifo();
            shared.push(WorkerShared {
                inbox: Inbox::new(),
                parker: Parker::new(),
                stealer: queue.stealer(),
            });
            queues.push(queue);
        }

        let id = SystemId::generate();
        let core = Arc::new(SystemCore {
            config,
            workers: shared,
            shutting_down: AtomicBool::new(false),
            stop_workers: AtomicBool::new(false),
            running: AtomicU64::new(0),
            finished_emitted: AtomicBool::new(false),
            round_robin: AtomicU64::new(0),
            id,
            all_fibers_finished: Event::unique(),
            main_block: Arc::new(ControlBlock::new_thread(Path::named("main"))),
            main_context_taken: AtomicBool::new(false),
        });

        let mut threads = Vec::with_capacity(core.config.worker_threads);
        for (worker_id, queue) in queues.into_iter().enumerate() {
            let worker = Worker::new(worker_id, queue, Arc::clone(&core));
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{worker_id}", core.config.thread_name_prefix))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    core.stop_workers.store(true, Ordering::Release);
                    for worker in &core.workers {
                        worker.parker.unpark();
                    }
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(Error::new(ErrorKind::StackExhausted)
                        .with_context("spawning worker thread")
                        .with_source(e));
                }
            }
        }

        debug!(system = %id, workers = threads.len(), "fiber system started");
        Ok(Self {
            handle: SystemHandle::from_core(core),
            threads,
        })
    }

    /// A cloneable handle onto this system.
    #[must_use]
    pub fn handle(&self) -> &SystemHandle {
        &self.handle
    }

    /// Fiberizes the launching thread: returns the [`Context`] attached to
    /// the main control block, so the caller can bind handlers, await
    /// events, and pump its mailbox.
    ///
    /// The context can be taken once per system.
    pub fn main_context(&self) -> Result<Context<'static>> {
        let core = self.handle.core();
        if core.main_context_taken.swap(true, Ordering::AcqRel) {
            return Err(Error::new(ErrorKind::AlreadyFiberized)
                .with_context("main context already taken"));
        }
        Ok(Context::for_thread(
            self.handle.clone(),
            Arc::clone(&core.main_block),
        ))
    }

    /// Starts configuring a fiber before spawning it.
    #[must_use]
    pub fn fiber(&self) -> FiberBuilder {
        self.handle.fiber()
    }

    /// Spawns a detached fiber running `body`. See [`SystemHandle::spawn`].
    pub fn spawn<F, T>(&self, body: F) -> Result<FiberRef>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn(body)
    }

    /// Spawns a fiber whose result is captured in a [`Promise`](crate::Promise).
    pub fn spawn_future<F, T>(&self, body: F) -> Result<FutureRef<T>>
    where
        F: FnOnce(&mut Context<'_>) -> T + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.handle.spawn_future(body)
    }

    /// Runs a [`Fiber`] implementation as a new fiber.
    pub fn run<FB: Fiber>(&self, fiber: FB) -> Result<FiberRef> {
        self.handle.run(fiber)
    }

    /// A reference to the fiberized launching thread.
    #[must_use]
    pub fn main_fiber(&self) -> FiberRef {
        self.handle.main_fiber()
    }

    /// The event announcing that the running-fiber count drained to zero.
    #[must_use]
    pub fn all_fibers_finished(&self) -> Event<()> {
        self.handle.all_fibers_finished()
    }

    /// Stops accepting new fibers.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.handle.is_shutting_down()
    }

    /// Number of fibers spawned and not yet dead.
    #[must_use]
    pub fn running_fibers(&self) -> u64 {
        self.handle.running_fibers()
    }

    /// This system's process-unique identity.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.handle.id()
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handle.worker_count()
    }
}

impl Drop for FiberSystem {
    fn drop(&mut self) {
        self.handle.shutdown();
        let core = self.handle.core();
        core.stop_workers.store(true, Ordering::Release);
        for worker in &core.workers {
            worker.parker.unpark();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!(system = %core.id, "fiber system stopped");
    }
}
