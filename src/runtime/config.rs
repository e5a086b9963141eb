//! System configuration and the builder that applies it.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_threads` | available CPU parallelism |
//! | `fiber_stack_size` | 128 KiB |
//! | `thread_name_prefix` | `"weft-worker"` |
//! | `park_timeout` | 1 ms |

use crate::error::Result;
use crate::runtime::system::FiberSystem;
use std::time::Duration;

/// The smallest stack the runtime will allocate for a fiber.
pub const MIN_FIBER_STACK: usize = 16 * 1024;

/// Configuration for a fiber system.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Number of worker threads (default: available parallelism).
    pub worker_threads: usize,
    /// Stack size per fiber, in bytes.
    pub fiber_stack_size: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// How long an idle worker parks between steal probes.
    pub park_timeout: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            fiber_stack_size: 128 * 1024,
            thread_name_prefix: "weft-worker".to_owned(),
            park_timeout: Duration::from_millis(1),
        }
    }
}

impl SystemConfig {
    /// Clamps configuration values to workable minimums.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.fiber_stack_size < MIN_FIBER_STACK {
            self.fiber_stack_size = MIN_FIBER_STACK;
        }
    }
}

/// Builder for constructing a [`FiberSystem`] with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct SystemBuilder {
    config: SystemConfig,
}

impl SystemBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn workers(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Sets the default stack size for fibers, in bytes.
    #[must_use]
    pub fn fiber_stack_size(mut self, bytes: usize) -> Self {
        self.config.fiber_stack_size = bytes;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Sets how long an idle worker parks between steal probes.
    #[must_use]
    pub fn park_timeout(mut self, timeout: Duration) -> Self {
        self.config.park_timeout = timeout;
        self
    }

    /// Starts a system from this configuration.
    pub fn build(self) -> Result<FiberSystem> {
        FiberSystem::start(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SystemConfig::default();
        assert!(config.worker_threads >= 1);
        assert!(config.fiber_stack_size >= MIN_FIBER_STACK);
        assert_eq!(config.thread_name_prefix, "weft-worker");
    }

    #[test]
    fn normalize_clamps_degenerate_values() {
        let mut config = SystemConfig {
            worker_threads: 0,
            fiber_stack_size: 1,
            ..SystemConfig::default()
        };
        config.normalize();
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.fiber_stack_size, MIN_FIBER_STACK);
    }

    #[test]
    fn builder_applies_settings() {
        let builder = SystemBuilder::new()
            .workers(3)
            .fiber_stack_size(256 * 1024)
            .thread_name_prefix("test-pool")
            .park_timeout(Duration::from_micros(500));
        assert_eq!(builder.config.worker_threads, 3);
        assert_eq!(builder.config.fiber_stack_size, 256 * 1024);
        assert_eq!(builder.config.thread_name_prefix, "test-pool");
        assert_eq!(builder.config.park_timeout, Duration::from_micros(500));
    }
}
