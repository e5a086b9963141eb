//! Weft: a user-space fiber runtime with path-addressed typed events.
//!
//! # Overview
//!
//! Weft multiplexes a large population of lightweight, cooperatively
//! scheduled tasks ("fibers") onto a small pool of worker threads. A fiber
//! owns its own stack, communicates with other fibers exclusively by
//! asynchronous messages carrying typed payloads, and suspends explicitly by
//! awaiting an event or yielding, never by preemption.
//!
//! # Core pieces
//!
//! - **Fibers**: stackful coroutines scheduled cooperatively across workers.
//! - **Events**: typed names with a [`Path`] identity. Fibers `bind` handlers
//!   for them, `emit` them at other fibers, and `await_next` them in a
//!   synchronous-looking style.
//! - **Handler stacking**: later bindings for the same path shadow earlier
//!   ones; a handler can delegate to the one below it with
//!   [`Context::super_call`].
//! - **Work stealing**: each worker owns a ready queue; idle workers steal
//!   from random siblings, so no fiber is starved while any worker is idle.
//! - **Lifecycle**: the system counts running fibers and emits
//!   `all_fibers_finished` to the main fiber when the count drains to zero.
//!
//! # Example
//!
//! ```no_run
//! use weft::{Event, FiberSystem};
//!
//! let system = FiberSystem::new().expect("system start");
//! let mut main = system.main_context().expect("main context");
//!
//! let greeting = Event::<String>::named("greeting");
//! let main_ref = system.main_fiber();
//!
//! system
//!     .spawn(move |_ctx| {
//!         main_ref.emit(&greeting, "hello from a fiber".to_owned());
//!     })
//!     .expect("spawn");
//!
//! let text = Event::<String>::named("greeting").await_next(&mut main);
//! println!("{text}");
//! ```
//!
//! # Module structure
//!
//! - [`path`]: event/fiber identity ([`Path`], [`Ident`], [`Locality`])
//! - [`event`]: typed events and the type-erased [`PendingEvent`]
//! - [`mailbox`]: the per-fiber multi-producer FIFO
//! - [`context`]: per-fiber dispatch state (bind, super, yield, await)
//! - [`fiber`]: fiber references and the send path
//! - [`promise`]: write-once result cells for future fibers
//! - [`builder`]: the spawn front-end (naming, pinning, stack size)
//! - [`runtime`]: control blocks, context switching, scheduler, system
//! - [`io`]: completion-mode tags consumed by I/O adapters
//! - [`error`]: error types

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod builder;
pub mod context;
pub mod error;
pub mod event;
pub mod fiber;
pub mod io;
pub mod mailbox;
pub mod path;
pub mod promise;
pub mod runtime;
pub mod util;

pub use builder::FiberBuilder;
pub use context::{Context, HandlerRef};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use event::{Event, PendingEvent};
pub use fiber::{Fiber, FiberRef, FutureRef};
pub use path::{Ident, Locality, Path};
pub use promise::Promise;
pub use runtime::config::{SystemBuilder, SystemConfig};
pub use runtime::control_block::WorkerId;
pub use runtime::system::{FiberSystem, SystemHandle, SystemId};
