//! Internal utilities for the runtime.

pub mod rng;

pub use rng::XorShift64;
