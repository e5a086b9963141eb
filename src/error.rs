//! Error types and error handling strategy.
//!
//! The message-delivery path never raises toward a sender: payloads that
//! cannot be delivered are released at the reference boundary. Errors here
//! surface only at the edges that can genuinely fail, such as spawning a
//! fiber or observing the outcome of a future.

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A fiber stack (or a worker thread) could not be allocated.
    StackExhausted,
    /// A fiber aborted with a panic.
    FiberCrashed,
    /// A fiber terminated cooperatively before producing a result.
    FiberKilled,
    /// A promise was dropped without ever being completed.
    PromiseDropped,
    /// The main thread was already fiberized.
    AlreadyFiberized,
    /// Internal runtime error (bug).
    Internal,
}

/// The main error type for runtime operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error reports a crashed fiber.
    #[must_use]
    pub const fn is_crash(&self) -> bool {
        matches!(self.kind, ErrorKind::FiberCrashed)
    }

    /// Returns true if this error reports a cooperative termination.
    #[must_use]
    pub const fn is_kill(&self) -> bool {
        matches!(self.kind, ErrorKind::FiberKilled)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a crash error carrying the panic message.
    #[must_use]
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FiberCrashed).with_context(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for runtime operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::StackExhausted).with_context("mmap failed");
        assert_eq!(err.to_string(), "StackExhausted: mmap failed");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::Internal)
            .with_context("outer")
            .with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn crashed_carries_message() {
        let err = Error::crashed("boom");
        assert!(err.is_crash());
        assert!(!err.is_kill());
        assert_eq!(err.to_string(), "FiberCrashed: boom");
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::FiberKilled));
        let err = res.context("await failed").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::FiberKilled);
        assert_eq!(err.to_string(), "FiberKilled: await failed");
    }
}
