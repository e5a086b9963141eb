//! Identity types for fibers and events.
//!
//! A [`Path`] is the key events and fibers are addressed by. Equality and
//! hashing are the only operations the runtime relies on; everything else
//! (naming, display) is for diagnostics.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

/// An identifier: a human-chosen name or a generated unique id.
///
/// Named identifiers compare by their text, so two [`Event`](crate::Event)s
/// constructed from the same name address the same handlers. Unique
/// identifiers never collide with anything else for the lifetime of the
/// process.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Ident {
    /// A human-readable name.
    Named(Arc<str>),
    /// A process-unique generated id.
    Unique(u64),
}

impl Ident {
    /// Creates a named identifier.
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::Named(Arc::from(name.as_ref()))
    }

    /// Generates a fresh unique identifier.
    #[must_use]
    pub fn unique() -> Self {
        Self::Unique(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name:?}"),
            Self::Unique(id) => write!(f, "#{id}"),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Unique(id) => write!(f, "#{id}"),
        }
    }
}

/// An opaque, hashable address used as handler-lookup key and event identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path(Ident);

impl Path {
    /// Creates a path from an identifier.
    #[must_use]
    pub const fn new(ident: Ident) -> Self {
        Self(ident)
    }

    /// Creates a named path.
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self(Ident::named(name))
    }

    /// Creates a fresh unique path.
    #[must_use]
    pub fn unique() -> Self {
        Self(Ident::unique())
    }

    /// Returns the identifier backing this path.
    #[must_use]
    pub const fn ident(&self) -> &Ident {
        &self.0
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where a fiber reference points.
///
/// Only local delivery is implemented; the variant exists so references can
/// report what they are without the caller probing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// The reference targets a fiber in this process.
    Local,
    /// The reference discards everything sent to it.
    DeadLetter,
}
