//! Entropy sources for inline mutation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of mutation draws. Quality only needs to be good enough to spread
/// bit flips across a payload.
pub trait EntropySource: Send + Sync {
    fn next_u64(&self) -> u64;
}

/// Deterministic xorshift64* generator, shareable across threads.
#[derive(Debug)]
pub struct XorShiftEntropy {
    state: AtomicU64,
}

impl XorShiftEntropy {
    /// A zero seed is remapped: xorshift has a fixed point at zero.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self {
            state: AtomicU64::new(seed),
        }
    }
}

const fn xorshift_step(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x
}

impl EntropySource for XorShiftEntropy {
    fn next_u64(&self) -> u64 {
        let prev = match self
            .state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(xorshift_step(x))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        xorshift_step(prev).wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

/// Time-derived entropy: nanoseconds since the epoch, mixed with a counter so
/// back-to-back draws differ.
#[derive(Debug, Default)]
pub struct ClockEntropy {
    counter: AtomicU64,
}

impl ClockEntropy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl EntropySource for ClockEntropy {
    fn next_u64(&self) -> u64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        xorshift_step(nanos ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }
}

/// Fixed sequence of draws, cycled. Test-only helper.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ScriptedEntropy {
    draws: Vec<u64>,
    next: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedEntropy {
    pub(crate) fn new(draws: Vec<u64>) -> Self {
        Self {
            draws,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl EntropySource for ScriptedEntropy {
    fn next_u64(&self) -> u64 {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.draws[i % self.draws.len()]
    }
}
