//! Dedup correlator between Hook 1 and Hook 2.
//!
//! Hook 1 marks each RPC-path call it sees; Hook 2 asks whether the call it is
//! about to classify was marked within the last second. A mark is consumed by
//! the first match, so one Hook 1 observation suppresses at most one Hook 2
//! observation.

/// Slots in the correlator ring.
pub const DEDUP_SLOTS: usize = 64;

/// Marks older than this never match.
pub const DEDUP_WINDOW_US: u64 = 1_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupEntry {
    pub client: u32,
    pub object: u32,
    pub command: u32,
    /// Zero means the slot is empty.
    pub timestamp_us: u64,
}

/// 64-slot overwrite ring of recent marks.
#[derive(Debug, Clone)]
pub struct DedupRing {
    entries: [DedupEntry; DEDUP_SLOTS],
    next: usize,
}

impl Default for DedupRing {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupRing {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [DedupEntry {
                client: 0,
                object: 0,
                command: 0,
                timestamp_us: 0,
            }; DEDUP_SLOTS],
            next: 0,
        }
    }

    /// Overwrite the next slot unconditionally.
    pub fn mark(&mut self, client: u32, object: u32, command: u32, now_us: u64) {
        self.entries[self.next] = DedupEntry {
            client,
            object,
            command,
            timestamp_us: now_us,
        };
        self.next = (self.next + 1) % DEDUP_SLOTS;
    }

    /// Scan newest to oldest; consume and report the first live match.
    pub fn take(&mut self, client: u32, object: u32, command: u32, now_us: u64) -> bool {
        for i in 0..DEDUP_SLOTS {
            let idx = (self.next + DEDUP_SLOTS - 1 - i) % DEDUP_SLOTS;
            let entry = &mut self.entries[idx];
            if entry.timestamp_us == 0
                || entry.client != client
                || entry.object != object
                || entry.command != command
            {
                continue;
            }
            if now_us >= entry.timestamp_us && now_us - entry.timestamp_us < DEDUP_WINDOW_US {
                *entry = DedupEntry::default();
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Marks currently held (expired or not).
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.timestamp_us != 0).count()
    }
}
