//! Injectable time source.
//!
//! The only timed logic in the engine is the dedup window, so the clock is a
//! seam: production uses [`SystemClock`], tests drive [`ManualClock`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond time source.
pub trait Clock: Send + Sync {
    /// Current time in microseconds, or `None` if no time is available.
    fn now_us(&self) -> Option<u64>;

    /// Current time in nanoseconds, derived from [`now_us`](Self::now_us).
    fn now_ns(&self) -> Option<u64> {
        self.now_us().map(|us| us.saturating_mul(1_000))
    }
}

/// Wall clock (microseconds since the Unix epoch).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> Option<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| u64::try_from(d.as_micros()).ok())
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
    available: AtomicBool,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
            available: AtomicBool::new(true),
        }
    }

    pub fn set(&self, us: u64) {
        self.now.store(us, Ordering::SeqCst);
    }

    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    /// Make subsequent reads return `None` (or restore them).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> Option<u64> {
        self.available
            .load(Ordering::SeqCst)
            .then(|| self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_nonzero_and_ns_scaled() {
        let clock = SystemClock;
        let us = clock.now_us().expect("system time after epoch");
        assert!(us > 0);
        let ns = clock.now_ns().expect("ns");
        assert!(ns >= us * 1_000);
    }

    #[test]
    fn manual_clock_advances_and_fails() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_us(), Some(10));
        clock.advance(5);
        assert_eq!(clock.now_us(), Some(15));
        assert_eq!(clock.now_ns(), Some(15_000));
        clock.set_available(false);
        assert_eq!(clock.now_us(), None);
        assert_eq!(clock.now_ns(), None);
        clock.set_available(true);
        clock.set(0);
        assert_eq!(clock.now_us(), Some(0));
    }
}
