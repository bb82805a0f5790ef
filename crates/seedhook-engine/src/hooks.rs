//! The two interception points.
//!
//! Hook 1 runs in the control prologue, before parameters are serialized.
//! Hook 2 runs just after serialization/dispatch and also sees RPCs that never
//! went through the prologue. The dedup correlator lets Hook 2 recognize calls
//! Hook 1 already recorded.

use serde::Serialize;

use crate::config::HookFlags;
use crate::engine::SeedHook;
use crate::record::{BoundedPayload, CallSite, SeedCapture, SeedSource};

/// Hook 2 classification. Exactly one per dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Hook2Class {
    /// Already observed by Hook 1.
    Duplicate,
    /// Issued by the driver itself, without a user context.
    Internal,
    /// User-originated but never went through the prologue.
    Bypass,
}

impl Hook2Class {
    #[must_use]
    pub const fn classify(from_prologue: bool, internal: bool) -> Self {
        if from_prologue {
            Self::Duplicate
        } else if internal {
            Self::Internal
        } else {
            Self::Bypass
        }
    }

    /// Seed-source bits for a Hook 2 record of this class.
    ///
    /// Duplicates report `HOOK1_PROLOGUE` so that `hook2_response` skips them.
    #[must_use]
    pub fn seed_source(self, serialized: bool) -> SeedSource {
        let class = match self {
            Self::Duplicate => return SeedSource::HOOK1_PROLOGUE,
            Self::Internal => SeedSource::HOOK2_INTERNAL,
            Self::Bypass => SeedSource::HOOK2_BYPASS,
        };
        let mut source = SeedSource::HOOK2_RPC | class;
        if serialized {
            source |= SeedSource::SERIALIZED;
        }
        source
    }
}

impl SeedHook {
    /// Hook 1 entry, before the call is dispatched.
    ///
    /// Counts the call and, on the RPC path, marks it for Hook 2 and possibly
    /// returns a mutated copy of `params` to send instead of the original.
    #[must_use]
    pub fn hook1_prologue(&self, site: &CallSite, params: &[u8]) -> Option<Vec<u8>> {
        if !self.is_enabled() {
            return None;
        }
        let rpc = site.is_rpc_path();
        {
            let mut st = self.state.lock();
            if !st.live {
                return None;
            }
            st.stats.total_hooks += 1;
            if rpc {
                st.stats.rpc_hooks += 1;
            } else {
                st.stats.local_hooks += 1;
            }
        }
        if !rpc {
            return None;
        }

        self.mark_from_prologue(site.client, site.object, site.command);
        if self.flag_enabled(HookFlags::INLINE_FUZZ) {
            self.mutate(params)
        } else {
            None
        }
    }

    /// Hook 1 exit. `original` must be the request as the caller issued it,
    /// never the mutated copy.
    ///
    /// Returns the sequence number of the stored seed. Storage failures are
    /// not reported to the hooked path.
    pub fn hook1_response(
        &self,
        site: &CallSite,
        original: BoundedPayload,
        status: u32,
        response: &[u8],
        latency_us: u64,
    ) -> Option<u64> {
        if !self.is_enabled() {
            return None;
        }
        let capture = SeedCapture::from_payload(*site, original)
            .response(status, response)
            .latency_us(latency_us)
            .source(SeedSource::HOOK1_PROLOGUE, false);
        self.record_seed(capture).ok().flatten()
    }

    /// Hook 2 classification of one dispatched RPC.
    ///
    /// `from_prologue` is the caller's result of `is_marked_from_prologue`.
    #[must_use]
    pub fn hook2_dispatch(
        &self,
        _site: &CallSite,
        serialized: bool,
        from_prologue: bool,
        internal: bool,
    ) -> Option<Hook2Class> {
        if !self.is_hook2_enabled() {
            return None;
        }
        let class = Hook2Class::classify(from_prologue, internal);

        let mut st = self.state.lock();
        if !st.live {
            return None;
        }
        let stats = &mut st.stats;
        stats.hook2_total_hooks += 1;
        match class {
            Hook2Class::Duplicate => stats.hook2_duplicates += 1,
            Hook2Class::Internal => stats.hook2_internal_hooks += 1,
            Hook2Class::Bypass => stats.hook2_bypass_hooks += 1,
        }
        if class != Hook2Class::Duplicate && serialized {
            stats.hook2_serialized_hooks += 1;
        }
        Some(class)
    }

    /// Hook 2 exit. Records a seed unless `source` says Hook 1 already did.
    ///
    /// Hook 2 has no access to control flags or access rights; both are
    /// stored as zero.
    #[allow(clippy::too_many_arguments)]
    pub fn hook2_response(
        &self,
        site: &CallSite,
        params: &[u8],
        serialized: bool,
        status: u32,
        response: &[u8],
        latency_us: u64,
        source: SeedSource,
    ) -> Option<u64> {
        if !self.is_hook2_enabled() || !self.flag_enabled(HookFlags::RECORD_SEED) {
            return None;
        }
        if source.contains(SeedSource::HOOK1_PROLOGUE) {
            return None;
        }
        let capture = SeedCapture::new(site.ctrl(0, 0), params)
            .response(status, response)
            .latency_us(latency_us)
            .source(source, serialized);
        self.store(capture, |stats| stats.hook2_seed_records += 1)
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::HookConfig;
    use crate::entropy::XorShiftEntropy;
    use std::sync::Arc;

    fn engine(flags: HookFlags) -> SeedHook {
        let hook = SeedHook::with_sources(
            HookConfig::with_flags(flags).capacity(16),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(XorShiftEntropy::new(3)),
        );
        hook.init().expect("init");
        hook
    }

    fn full() -> HookFlags {
        HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::RECORD_RESPONSE | HookFlags::HOOK2_ENABLED
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(Hook2Class::classify(true, true), Hook2Class::Duplicate);
        assert_eq!(Hook2Class::classify(false, true), Hook2Class::Internal);
        assert_eq!(Hook2Class::classify(false, false), Hook2Class::Bypass);
    }

    #[test]
    fn seed_source_bits() {
        assert_eq!(Hook2Class::Duplicate.seed_source(true), SeedSource::HOOK1_PROLOGUE);
        assert_eq!(Hook2Class::Bypass.seed_source(false).bits(), 0x06);
        assert_eq!(Hook2Class::Internal.seed_source(true).bits(), 0x1A);
    }

    #[test]
    fn prologue_counts_local_and_rpc() {
        let hook = engine(full());
        assert!(hook.hook1_prologue(&CallSite::new(1, 2, 3), &[0]).is_none());
        assert!(hook.hook1_prologue(&CallSite::new(1, 2, 4).rpc(), &[0]).is_none());
        let stats = hook.get_stats();
        assert_eq!((stats.total_hooks, stats.rpc_hooks, stats.local_hooks), (2, 1, 1));
        // Only the RPC-path call was marked.
        assert!(!hook.is_marked_from_prologue(1, 2, 3));
        assert!(hook.is_marked_from_prologue(1, 2, 4));
    }

    #[test]
    fn prologue_is_silent_when_disabled() {
        let hook = engine(HookFlags::RECORD_SEED);
        assert!(hook.hook1_prologue(&CallSite::new(1, 2, 3).rpc(), &[0]).is_none());
        assert_eq!(hook.get_stats().total_hooks, 0);
    }

    #[test]
    fn prologue_mutates_on_rpc_path_only() {
        let hook = engine(HookFlags::ENABLED | HookFlags::INLINE_FUZZ);
        hook.set_config(
            HookConfig::with_flags(HookFlags::ENABLED | HookFlags::INLINE_FUZZ)
                .capacity(16)
                .mutation_probability(100),
        )
        .expect("set_config");
        let params = [0xFF_u8; 8];
        assert!(hook.hook1_prologue(&CallSite::new(1, 1, 1), &params).is_none());
        let mutated = hook
            .hook1_prologue(&CallSite::new(1, 1, 1).rpc(), &params)
            .expect("mutated");
        let flipped: u32 = mutated.iter().zip(params).map(|(a, b)| (a ^ b).count_ones()).sum();
        assert_eq!(flipped, 1);
        assert_eq!(hook.get_stats().inline_fuzz_count, 1);
    }

    #[test]
    fn hook1_response_records_original() {
        let hook = engine(full());
        let site = CallSite::new(7, 8, 9).rpc().ctrl(0x40, 0x2);
        let seq = hook.hook1_response(&site, BoundedPayload::capture(&[1, 2]), 0, &[3], 12);
        assert_eq!(seq, Some(0));
        let rec = &hook.copy_seeds(0, 1, 1)[0];
        assert_eq!(rec.params.as_slice(), &[1, 2]);
        assert_eq!(rec.response.as_slice(), &[3]);
        assert_eq!((rec.ctrl_flags, rec.access_right), (0x40, 0x2));
        assert_eq!(rec.source, SeedSource::HOOK1_PROLOGUE);
        assert!(!rec.serialized);
    }

    #[test]
    fn dispatch_classifies_and_counts_serialized() {
        let hook = engine(full());
        let site = CallSite::new(1, 2, 3);
        assert_eq!(hook.hook2_dispatch(&site, true, true, false), Some(Hook2Class::Duplicate));
        assert_eq!(hook.hook2_dispatch(&site, true, false, true), Some(Hook2Class::Internal));
        assert_eq!(hook.hook2_dispatch(&site, false, false, false), Some(Hook2Class::Bypass));
        let stats = hook.get_stats();
        assert_eq!(stats.hook2_total_hooks, 3);
        assert_eq!(
            (stats.hook2_duplicates, stats.hook2_internal_hooks, stats.hook2_bypass_hooks),
            (1, 1, 1)
        );
        assert_eq!(stats.hook2_serialized_hooks, 1);
        assert!(stats.classification_balanced());
    }

    #[test]
    fn dispatch_requires_hook2() {
        let hook = engine(HookFlags::ENABLED | HookFlags::RECORD_SEED);
        assert_eq!(hook.hook2_dispatch(&CallSite::new(1, 2, 3), true, false, false), None);
        assert_eq!(hook.get_stats().hook2_total_hooks, 0);
    }

    #[test]
    fn hook2_response_skips_hook1_sources() {
        let hook = engine(full());
        let site = CallSite::new(1, 2, 3).ctrl(5, 6);
        assert_eq!(
            hook.hook2_response(&site, &[1], true, 0, &[], 1, Hook2Class::Duplicate.seed_source(true)),
            None
        );
        let source = Hook2Class::Bypass.seed_source(true);
        assert_eq!(hook.hook2_response(&site, &[1], true, 0, &[2], 1, source), Some(0));
        let stats = hook.get_stats();
        assert_eq!((stats.seed_records, stats.hook2_seed_records), (1, 1));
        let rec = &hook.copy_seeds(0, 1, 1)[0];
        assert_eq!((rec.ctrl_flags, rec.access_right), (0, 0));
        assert_eq!(rec.source, source);
        assert!(rec.serialized);
    }

    #[test]
    fn hook2_response_needs_record_seed() {
        let hook = engine(HookFlags::ENABLED | HookFlags::HOOK2_ENABLED);
        let source = Hook2Class::Internal.seed_source(false);
        assert_eq!(hook.hook2_response(&CallSite::new(1, 2, 3), &[1], false, 0, &[], 1, source), None);
        assert_eq!(hook.get_stats().hook2_seed_records, 0);
    }
}
