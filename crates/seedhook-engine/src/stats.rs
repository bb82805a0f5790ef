//! Hook counters.
//!
//! Unlike a relaxed-atomics metrics block, these counters are mutated only
//! under the engine lock so that multi-counter updates (e.g. a Hook 2
//! classification) are observed atomically by `get_stats`.

use serde::{Deserialize, Serialize};

/// Counter snapshot for both interception points.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookStats {
    /// Hook 1 invocations while enabled.
    pub total_hooks: u64,
    /// Hook 1 calls on the offloaded RPC path.
    pub rpc_hooks: u64,
    /// Hook 1 calls handled locally.
    pub local_hooks: u64,
    /// Seeds written to the ring (cumulative; source of sequence numbers).
    pub seed_records: u64,
    /// Mutated parameter copies produced.
    pub inline_fuzz_count: u64,
    /// Truncations and scratch allocation failures.
    pub errors: u64,
    pub hook2_total_hooks: u64,
    /// Hook 2 calls already seen by Hook 1.
    pub hook2_duplicates: u64,
    pub hook2_bypass_hooks: u64,
    pub hook2_internal_hooks: u64,
    /// Non-duplicate Hook 2 calls that went through wire serialization.
    pub hook2_serialized_hooks: u64,
    /// Seeds written by Hook 2.
    pub hook2_seed_records: u64,
}

impl HookStats {
    /// Every Hook 2 call lands in exactly one class.
    #[must_use]
    pub fn classification_balanced(&self) -> bool {
        self.hook2_duplicates + self.hook2_bypass_hooks + self.hook2_internal_hooks
            == self.hook2_total_hooks
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
