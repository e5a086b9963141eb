//! Typed events and their type-erased wire form.
//!
//! An [`Event<A>`] is a typed name: a [`Path`] plus the payload type carried
//! by each occurrence. Emitting one boxes the value into a [`PendingEvent`],
//! which travels through the target's mailbox and is downcast back at
//! dispatch. Ownership of the payload transfers on enqueue; dropping a
//! `PendingEvent` on any exit path releases the payload exactly once.

use crate::context::{Context, HandlerRef};
use crate::path::Path;
use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

/// A type-erased event in flight: a path plus a boxed payload.
pub struct PendingEvent {
    path: Path,
    payload: Box<dyn Any + Send>,
}

impl std::fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEvent")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PendingEvent {
    /// Boxes `value` as the payload of an event addressed by `path`.
    #[must_use]
    pub fn new<A: Send + 'static>(path: Path, value: A) -> Self {
        Self {
            path,
            payload: Box::new(value),
        }
    }

    /// The path this event is addressed by.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrows the erased payload.
    #[must_use]
    pub fn payload(&self) -> &(dyn Any + Send) {
        self.payload.as_ref()
    }

    /// Splits the event into its path and payload for dispatch.
    #[must_use]
    pub(crate) fn into_parts(self) -> (Path, Box<dyn Any + Send>) {
        (self.path, self.payload)
    }
}

/// A typed event name.
///
/// Two events with equal paths address the same handler stack, regardless of
/// where each value was constructed. The type parameter is the payload type
/// attached to every occurrence; `Event<()>` is a bare signal.
pub struct Event<A> {
    path: Path,
    _payload: PhantomData<fn(A) -> A>,
}

impl<A> Clone for Event<A> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _payload: PhantomData,
        }
    }
}

impl<A> std::fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Event").field(&self.path).finish()
    }
}

impl<A: Send + 'static> Event<A> {
    /// Creates an event with the given name.
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::from_path(Path::named(name))
    }

    /// Creates an event with a fresh, process-unique path.
    #[must_use]
    pub fn unique() -> Self {
        Self::from_path(Path::unique())
    }

    /// Creates an event addressed by an existing path.
    #[must_use]
    pub fn from_path(path: Path) -> Self {
        Self {
            path,
            _payload: PhantomData,
        }
    }

    /// Returns the path of this event.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binds a handler for this event in the given context.
    ///
    /// The new handler lands on top of the stack for this path: it shadows
    /// earlier bindings until it delegates with
    /// [`Context::super_call`] or is destroyed. The returned [`HandlerRef`]
    /// destroys the binding when dropped; call [`HandlerRef::detach`] to
    /// keep the handler bound for the life of the fiber.
    pub fn bind<F>(&self, ctx: &mut Context<'_>, f: F) -> HandlerRef
    where
        F: Fn(&mut Context<'_>, &A) + 'static,
    {
        ctx.bind_erased(
            self.path.clone(),
            Box::new(move |ctx, payload| {
                if let Some(value) = payload.downcast_ref::<A>() {
                    f(ctx, value);
                }
            }),
        )
    }

    /// Waits until this event occurs and returns its value.
    ///
    /// Installs a one-shot handler on top of the stack, then pumps the
    /// mailbox until that handler fires. The handler delegates to the rest
    /// of the stack first, so existing bindings still observe the
    /// occurrence. Events queued behind the waking one stay in the mailbox
    /// for the next processing point. The one-shot binding is removed
    /// before this returns.
    pub fn await_next(&self, ctx: &mut Context<'_>) -> A
    where
        A: Clone,
    {
        let slot: Rc<RefCell<Option<A>>> = Rc::new(RefCell::new(None));
        let filled = Rc::clone(&slot);
        let guard = ctx.bind_erased(
            self.path.clone(),
            Box::new(move |ctx, payload| {
                ctx.super_call();
                if let Some(value) = payload.downcast_ref::<A>() {
                    *filled.borrow_mut() = Some(value.clone());
                }
            }),
        );

        ctx.yield_until(&|| slot.borrow().is_some());
        drop(guard);
        let value = slot.borrow_mut().take().expect("awaited value missing");
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_events_share_a_path() {
        let a = Event::<u32>::named("tick");
        let b = Event::<u32>::named("tick");
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn unique_events_do_not_collide() {
        let a = Event::<u32>::unique();
        let b = Event::<u32>::unique();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn pending_event_round_trips_payload() {
        let ev = PendingEvent::new(Path::named("tick"), 17u32);
        assert_eq!(ev.path(), &Path::named("tick"));
        assert_eq!(ev.payload().downcast_ref::<u32>(), Some(&17));

        let (path, payload) = ev.into_parts();
        assert_eq!(path, Path::named("tick"));
        assert_eq!(payload.downcast_ref::<u32>(), Some(&17));
    }
}
