//! The seed hook engine.
//!
//! One [`SeedHook`] owns the configuration, the seed ring, the dedup ring and
//! the counters behind a single `parking_lot::Mutex`. Two atomics (the enabled
//! flag and a mirror of the config flags) let the interception points bail out
//! without touching the lock when the engine is off.
//!
//! Buffers are never allocated or freed under the lock. A ring swap prepares
//! the replacement first, publishes it under the lock, and drops the retired
//! ring after the guard is released.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::{HookConfig, HookFlags};
use crate::dedup::DedupRing;
use crate::entropy::{ClockEntropy, EntropySource};
use crate::error::HookError;
use crate::record::{BoundedPayload, SeedCapture, SeedRecord};
use crate::ring::SeedRing;
use crate::stats::HookStats;

pub(crate) struct EngineState {
    pub(crate) live: bool,
    pub(crate) config: HookConfig,
    pub(crate) ring: Option<SeedRing>,
    pub(crate) stats: HookStats,
    pub(crate) dedup: DedupRing,
}

/// Seed-capture engine context. Share it behind an `Arc`.
pub struct SeedHook {
    initialized: AtomicBool,
    enabled: AtomicBool,
    flags: AtomicU32,
    fuzz_probability: AtomicU32,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
}

impl fmt::Debug for SeedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedHook")
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("flags", &HookFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)))
            .finish_non_exhaustive()
    }
}

impl Default for SeedHook {
    fn default() -> Self {
        Self::new()
    }
}

fn prepare_ring(capacity: u32) -> Result<Option<SeedRing>, HookError> {
    match capacity {
        0 => Ok(None),
        n => SeedRing::prepare(n as usize).map(Some),
    }
}

impl SeedHook {
    /// Uninitialized engine with the default configuration, wall clock and
    /// time-derived entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HookConfig::default())
    }

    /// Uninitialized engine that will start with `config` on `init()`.
    #[must_use]
    pub fn with_config(config: HookConfig) -> Self {
        Self::with_sources(config, Arc::new(SystemClock), Arc::new(ClockEntropy::new()))
    }

    #[must_use]
    pub fn with_sources(
        config: HookConfig,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
    ) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            flags: AtomicU32::new(0),
            fuzz_probability: AtomicU32::new(0),
            state: Mutex::new(EngineState {
                live: false,
                config,
                ring: None,
                stats: HookStats::default(),
                dedup: DedupRing::new(),
            }),
            clock,
            entropy,
        }
    }

    // Caller holds the state lock.
    fn publish(&self, config: &HookConfig) {
        self.flags.store(config.flags.bits(), Ordering::SeqCst);
        self.fuzz_probability
            .store(config.clamped_probability(), Ordering::SeqCst);
        self.enabled
            .store(config.flags.contains(HookFlags::ENABLED), Ordering::SeqCst);
    }

    /// Allocate the ring for the current capacity and go live. Idempotent.
    ///
    /// The engine becomes enabled iff the retained configuration has
    /// `ENABLED` set.
    ///
    /// # Errors
    ///
    /// [`HookError::ResourceExhausted`] if the ring cannot be allocated;
    /// nothing is installed in that case.
    pub fn init(&self) -> Result<(), HookError> {
        let capacity = {
            let st = self.state.lock();
            if st.live {
                return Ok(());
            }
            st.config.capacity
        };

        // Capacity only changes through set_config, which requires a live engine.
        let ring = prepare_ring(capacity)?;

        let mut st = self.state.lock();
        if st.live {
            drop(st);
            return Ok(());
        }
        st.ring = ring;
        st.dedup.clear();
        st.live = true;
        self.initialized.store(true, Ordering::SeqCst);
        let config = st.config;
        self.publish(&config);
        Ok(())
    }

    /// Disable and release the ring. Idempotent.
    ///
    /// Counters survive; they are hidden from `get_stats` until the next
    /// `init()`.
    pub fn cleanup(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.enabled.store(false, Ordering::SeqCst);

        let retired = {
            let mut st = self.state.lock();
            st.live = false;
            st.dedup.clear();
            // A set_config that got the lock first may have republished.
            self.enabled.store(false, Ordering::SeqCst);
            self.flags.store(0, Ordering::SeqCst);
            st.ring.take()
        };
        drop(retired);
    }

    /// Replace the configuration.
    ///
    /// A capacity change installs a freshly zeroed ring (previous contents are
    /// discarded). A same-capacity update keeps ring contents and counters.
    ///
    /// # Errors
    ///
    /// - [`HookError::InvalidState`] if the engine is not initialized.
    /// - [`HookError::ResourceExhausted`] if the replacement ring cannot be
    ///   allocated; the previous state is left untouched.
    pub fn set_config(&self, config: HookConfig) -> Result<(), HookError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(HookError::InvalidState);
        }

        let current = {
            let st = self.state.lock();
            if !st.live {
                return Err(HookError::InvalidState);
            }
            st.config.capacity
        };

        if current == config.capacity {
            let mut st = self.state.lock();
            if !st.live {
                return Err(HookError::InvalidState);
            }
            if st.config.capacity == config.capacity {
                st.config = config;
                self.publish(&config);
                return Ok(());
            }
        }

        let replacement = prepare_ring(config.capacity)?;
        let retired = {
            let mut st = self.state.lock();
            if !st.live {
                return Err(HookError::InvalidState);
            }
            st.config = config;
            self.publish(&config);
            std::mem::replace(&mut st.ring, replacement)
        };
        drop(retired);
        Ok(())
    }

    /// Configuration snapshot; all zero when not initialized.
    #[must_use]
    pub fn get_config(&self) -> HookConfig {
        let st = self.state.lock();
        if st.live { st.config } else { HookConfig::zeroed() }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Lock-free check of the enabled flag.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enabled and `flag` set in the published configuration. Lock-free; may
    /// lag a concurrent `set_config` by one call.
    #[must_use]
    pub fn flag_enabled(&self, flag: HookFlags) -> bool {
        self.is_enabled()
            && HookFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)).contains(flag)
    }

    #[must_use]
    pub fn is_hook2_enabled(&self) -> bool {
        self.flag_enabled(HookFlags::HOOK2_ENABLED)
    }

    #[must_use]
    pub fn is_response_recording_enabled(&self) -> bool {
        self.flag_enabled(HookFlags::RECORD_RESPONSE)
    }

    /// Store one seed.
    ///
    /// Returns the assigned sequence number, or `None` if the engine is
    /// disabled or seed recording is off.
    ///
    /// # Errors
    ///
    /// [`HookError::ResourceExhausted`] if no ring is installed.
    pub fn record_seed(&self, capture: SeedCapture) -> Result<Option<u64>, HookError> {
        self.store(capture, |_| {})
    }

    /// `record_seed` with an extra counter update applied in the same
    /// critical section.
    pub(crate) fn store(
        &self,
        mut capture: SeedCapture,
        also: impl FnOnce(&mut HookStats),
    ) -> Result<Option<u64>, HookError> {
        if !self.flag_enabled(HookFlags::RECORD_SEED) {
            return Ok(None);
        }
        let timestamp_ns = self.clock.now_ns().unwrap_or(0);

        let (sequence, evicted, discarded) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if !st.live || !st.config.flags.contains(HookFlags::ENABLED | HookFlags::RECORD_SEED) {
                return Ok(None);
            }
            let Some(ring) = st.ring.as_mut().filter(|r| r.capacity() > 0) else {
                return Err(HookError::ResourceExhausted {
                    requested: std::mem::size_of::<SeedRecord>(),
                });
            };

            let discarded = if st.config.flags.contains(HookFlags::RECORD_RESPONSE) {
                BoundedPayload::default()
            } else {
                std::mem::take(&mut capture.response)
            };
            if capture.truncated() {
                st.stats.errors += 1;
            }

            let sequence = st.stats.seed_records;
            let evicted = ring.push(SeedRecord::from_capture(capture, timestamp_ns, sequence));
            st.stats.seed_records += 1;
            also(&mut st.stats);
            (sequence, evicted, discarded)
        };
        drop((evicted, discarded));
        Ok(Some(sequence))
    }

    /// Possibly return a copy of `params` with one bit flipped.
    ///
    /// The draw is taken from the entropy source: `draw % 100` below the
    /// clamped probability mutates. `params` itself is never modified.
    #[must_use]
    pub fn mutate(&self, params: &[u8]) -> Option<Vec<u8>> {
        if params.is_empty() || !self.flag_enabled(HookFlags::INLINE_FUZZ) {
            return None;
        }
        let probability = u64::from(self.fuzz_probability.load(Ordering::Relaxed));
        if self.entropy.next_u64() % 100 >= probability {
            return None;
        }

        let mut scratch = Vec::new();
        if scratch.try_reserve_exact(params.len()).is_err() {
            self.state.lock().stats.errors += 1;
            return None;
        }
        scratch.extend_from_slice(params);

        let v = self.entropy.next_u64();
        let idx = (v % params.len() as u64) as usize;
        scratch[idx] ^= 1_u8 << (v % 8);

        self.state.lock().stats.inline_fuzz_count += 1;
        Some(scratch)
    }

    /// Counter snapshot; all zero when not initialized.
    #[must_use]
    pub fn get_stats(&self) -> HookStats {
        let st = self.state.lock();
        if st.live { st.stats } else { HookStats::default() }
    }

    /// Zero counters, rewind and scrub the ring.
    ///
    /// Configuration and pending Hook 1 marks are untouched, so a call in
    /// flight across the clear is still recorded once.
    pub fn clear_stats(&self) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.stats.reset();
        if let Some(ring) = st.ring.as_mut() {
            ring.scrub();
        }
    }

    /// Number of seeds currently readable.
    #[must_use]
    pub fn available_seeds(&self) -> usize {
        let st = self.state.lock();
        match (&st.ring, st.live) {
            (Some(ring), true) => ring.available(),
            _ => 0,
        }
    }

    /// Copy up to `min(requested, dest_capacity)` seeds starting at logical
    /// position `start` (0 = oldest available), oldest first.
    #[must_use]
    pub fn copy_seeds(&self, start: usize, requested: usize, dest_capacity: usize) -> Vec<SeedRecord> {
        if requested == 0 || dest_capacity == 0 {
            return Vec::new();
        }
        let st = self.state.lock();
        if !st.live {
            return Vec::new();
        }
        st.ring
            .as_ref()
            .map(|ring| ring.window(start, requested.min(dest_capacity)))
            .unwrap_or_default()
    }

    fn dedup_now(&self) -> Option<u64> {
        if !self.is_hook2_enabled() {
            return None;
        }
        self.clock.now_us().filter(|&t| t != 0)
    }

    /// Note that Hook 1 saw this call on the RPC path.
    pub fn mark_from_prologue(&self, client: u32, object: u32, command: u32) {
        let Some(now) = self.dedup_now() else {
            return;
        };
        let mut st = self.state.lock();
        if st.live {
            st.dedup.mark(client, object, command, now);
        }
    }

    /// Consume a matching mark made within the last second.
    #[must_use]
    pub fn is_marked_from_prologue(&self, client: u32, object: u32, command: u32) -> bool {
        let Some(now) = self.dedup_now() else {
            return false;
        };
        let mut st = self.state.lock();
        st.live && st.dedup.take(client, object, command, now)
    }
}

impl Drop for SeedHook {
    fn drop(&mut self) {
        self.cleanup();
    }
}
