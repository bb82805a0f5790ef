//! Fixed-capacity circular seed store.
//!
//! A ring is never resized in place. A replacement is built with
//! [`SeedRing::prepare`] (which may fail) and swapped in by the engine.

use crate::error::HookError;
use crate::record::SeedRecord;

/// Circular buffer of [`SeedRecord`] slots with a write cursor.
#[derive(Debug)]
pub struct SeedRing {
    slots: Vec<SeedRecord>,
    cursor: usize,
    written: u64,
}

impl SeedRing {
    /// Allocate `capacity` zeroed slots.
    ///
    /// # Errors
    ///
    /// [`HookError::ResourceExhausted`] if the slot array cannot be allocated.
    pub fn prepare(capacity: usize) -> Result<Self, HookError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| HookError::ResourceExhausted {
            requested: capacity.saturating_mul(std::mem::size_of::<SeedRecord>()),
        })?;
        slots.resize_with(capacity, SeedRecord::zeroed);
        Ok(Self {
            slots,
            cursor: 0,
            written: 0,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Records currently readable: `min(written, capacity)`.
    #[must_use]
    pub fn available(&self) -> usize {
        usize::try_from(self.written).map_or(self.capacity(), |w| w.min(self.capacity()))
    }

    /// Store `record` at the cursor and advance. Returns the evicted slot
    /// contents so the caller can drop them outside its critical section.
    ///
    /// Must not be called on a zero-capacity ring.
    pub fn push(&mut self, record: SeedRecord) -> SeedRecord {
        let cap = self.capacity();
        debug_assert!(cap > 0, "push on zero-capacity ring");
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % cap;
        self.written = self.written.wrapping_add(1);
        std::mem::replace(&mut self.slots[slot], record)
    }

    /// Physical slot for logical position `p` (0 = oldest available).
    fn physical(&self, p: usize) -> usize {
        let cap = self.capacity();
        (self.cursor + cap - self.available() + p) % cap
    }

    /// Record at logical position `p`, if available.
    #[must_use]
    pub fn get(&self, p: usize) -> Option<&SeedRecord> {
        (p < self.available()).then(|| &self.slots[self.physical(p)])
    }

    /// Clone a window of at most `limit` records starting at logical `start`.
    pub fn window(&self, start: usize, limit: usize) -> Vec<SeedRecord> {
        let available = self.available();
        if start >= available {
            return Vec::new();
        }
        let count = limit.min(available - start);
        (start..start + count)
            .map(|p| self.slots[self.physical(p)].clone())
            .collect()
    }

    /// Zero every slot in place and rewind the cursor.
    pub fn scrub(&mut self) {
        for slot in &mut self.slots {
            slot.scrub();
        }
        self.cursor = 0;
        self.written = 0;
    }
}
