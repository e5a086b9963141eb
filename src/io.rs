//! Completion-mode tags for I/O adapters.
//!
//! The scheduler core does not perform I/O itself; adapters built on top of
//! it choose, per operation, how completion is delivered:
//!
//! - [`Block`]: block the fiber and its worker thread until the operation
//!   finishes. No events are processed and no other fiber runs on that
//!   core. Right for cheap, predictable operations where handing the work
//!   elsewhere costs more than doing it.
//! - [`Await`]: block only the fiber; the worker keeps processing events
//!   and running other fibers until the operation finishes. Usually the
//!   default.
//! - [`Async`]: return immediately with a [`Promise`] that completes when
//!   the operation does.
//!
//! Adapters are generic over the mode and use [`Mode::Completion`] as their
//! return type, so `open::<Block>(..) -> File`,
//! `open::<Async>(..) -> Promise<File>`.

use crate::promise::Promise;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Block {}
    impl Sealed for super::Await {}
    impl Sealed for super::Async {}
}

/// Block the fiber and its worker thread until the operation completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Block;

/// Block only the fiber, processing events while the operation runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Await;

/// Start the operation and report completion through a [`Promise`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Async;

/// Maps an operation's value type to what the caller receives in each mode.
pub trait Mode: sealed::Sealed {
    /// What a caller gets back: the value itself for [`Block`] and
    /// [`Await`], a [`Promise`] of it for [`Async`].
    type Completion<V: Clone + Send + 'static>;
}

impl Mode for Block {
    type Completion<V: Clone + Send + 'static> = V;
}

impl Mode for Await {
    type Completion<V: Clone + Send + 'static> = V;
}

impl Mode for Async {
    type Completion<V: Clone + Send + 'static> = Promise<V>;
}
