//! Small pseudo-random number generator for scheduling decisions.
//!
//! Steal-victim and worker-placement choices only need a cheap, well-mixed
//! source, not a cryptographic one. This is xorshift64, seeded once per
//! worker (or per sending thread) from OS entropy.

use std::cell::RefCell;

/// A pseudo-random number generator using xorshift64.
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a new generator with the given seed.
    ///
    /// A zero seed would trap the generator at zero, so it is replaced
    /// with 1.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Creates a generator seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        let mut buf = [0u8; 8];
        // Falling back to a fixed seed only changes victim selection, never
        // correctness.
        let _ = getrandom::getrandom(&mut buf);
        Self::new(u64::from_le_bytes(buf))
    }

    /// Generates the next pseudo-random u64 value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generates a pseudo-random usize value in the range [0, bound).
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_usize(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be non-zero");
        (self.next_u64() as usize) % bound
    }
}

thread_local! {
    static THREAD_RNG: RefCell<XorShift64> = RefCell::new(XorShift64::from_entropy());
}

/// Runs `f` with this thread's scheduling RNG.
pub(crate) fn with_thread_rng<R>(f: impl FnOnce(&mut XorShift64) -> R) -> R {
    THREAD_RNG.with(|rng| f(&mut rng.borrow_mut()))
}
