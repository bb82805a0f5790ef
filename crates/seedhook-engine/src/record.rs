//! Seed record model.
//!
//! A [`SeedRecord`] is one captured control call. Request and response bytes
//! are held in [`BoundedPayload`]s, which never exceed [`MAX_PARAMS_SIZE`] and
//! remember whether the source had to be cut.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Upper bound on stored request and response bytes.
pub const MAX_PARAMS_SIZE: usize = 64 * 1024;

bitflags! {
    /// Which interception point produced a seed. Values are part of the
    /// record wire format.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SeedSource: u8 {
        const HOOK1_PROLOGUE = 0x01;
        const HOOK2_RPC = 0x02;
        const HOOK2_BYPASS = 0x04;
        const HOOK2_INTERNAL = 0x08;
        const SERIALIZED = 0x10;
    }
}

impl SeedSource {
    /// Short operator-facing label (`Hook1`, `Hook2-Bypass`, ...).
    #[must_use]
    pub fn label(self) -> &'static str {
        if self.contains(Self::HOOK1_PROLOGUE) {
            "Hook1"
        } else if self.contains(Self::HOOK2_RPC) {
            if self.contains(Self::HOOK2_BYPASS) {
                "Hook2-Bypass"
            } else if self.contains(Self::HOOK2_INTERNAL) {
                "Hook2-Internal"
            } else {
                "Hook2"
            }
        } else {
            "Unknown"
        }
    }
}

/// Identity and routing of one control call as seen by the hooks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub gpu_instance: u32,
    /// Call executes on the offload processor.
    pub offloaded: bool,
    /// Call is routed to the physical device (RPC path) rather than handled locally.
    pub route_to_physical: bool,
    pub client: u32,
    pub object: u32,
    pub command: u32,
    pub ctrl_flags: u32,
    pub access_right: u32,
}

impl CallSite {
    #[must_use]
    pub const fn new(client: u32, object: u32, command: u32) -> Self {
        Self {
            gpu_instance: 0,
            offloaded: false,
            route_to_physical: false,
            client,
            object,
            command,
            ctrl_flags: 0,
            access_right: 0,
        }
    }

    /// Mark the call as taking the offloaded RPC path.
    #[must_use]
    pub const fn rpc(mut self) -> Self {
        self.offloaded = true;
        self.route_to_physical = true;
        self
    }

    #[must_use]
    pub const fn gpu_instance(mut self, instance: u32) -> Self {
        self.gpu_instance = instance;
        self
    }

    #[must_use]
    pub const fn ctrl(mut self, ctrl_flags: u32, access_right: u32) -> Self {
        self.ctrl_flags = ctrl_flags;
        self.access_right = access_right;
        self
    }

    /// Offloaded and routed to the physical device.
    #[must_use]
    pub const fn is_rpc_path(&self) -> bool {
        self.offloaded && self.route_to_physical
    }
}

/// Byte buffer capped at [`MAX_PARAMS_SIZE`].
///
/// If allocating the copy fails the payload is empty and flagged truncated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BoundedPayload {
    data: Vec<u8>,
    truncated: bool,
}

impl BoundedPayload {
    /// Copy up to `MAX_PARAMS_SIZE` bytes of `bytes`.
    #[must_use]
    pub fn capture(bytes: &[u8]) -> Self {
        let take = bytes.len().min(MAX_PARAMS_SIZE);
        let mut data = Vec::new();
        if data.try_reserve_exact(take).is_err() {
            return Self {
                data,
                truncated: !bytes.is_empty(),
            };
        }
        data.extend_from_slice(&bytes[..take]);
        Self {
            data,
            truncated: take < bytes.len(),
        }
    }

    /// Rebuild from previously stored parts (e.g. a decoded wire record).
    #[must_use]
    pub fn from_parts(mut data: Vec<u8>, truncated: bool) -> Self {
        let truncated = truncated || data.len() > MAX_PARAMS_SIZE;
        data.truncate(MAX_PARAMS_SIZE);
        Self { data, truncated }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Zero and drop the contents without releasing the allocation.
    pub(crate) fn scrub(&mut self) {
        self.data.fill(0);
        self.data.clear();
        self.truncated = false;
    }
}

/// Input to `SeedHook::record_seed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedCapture {
    pub site: CallSite,
    pub params: BoundedPayload,
    pub response_status: u32,
    pub response: BoundedPayload,
    pub latency_us: u64,
    pub source: SeedSource,
    pub serialized: bool,
}

impl SeedCapture {
    /// Capture the request side of a call.
    #[must_use]
    pub fn new(site: CallSite, params: &[u8]) -> Self {
        Self::from_payload(site, BoundedPayload::capture(params))
    }

    /// Same as [`new`](Self::new) with an already bounded request.
    #[must_use]
    pub fn from_payload(site: CallSite, params: BoundedPayload) -> Self {
        Self {
            site,
            params,
            source: SeedSource::HOOK1_PROLOGUE,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn response(mut self, status: u32, bytes: &[u8]) -> Self {
        self.response_status = status;
        self.response = BoundedPayload::capture(bytes);
        self
    }

    #[must_use]
    pub fn status(mut self, status: u32) -> Self {
        self.response_status = status;
        self
    }

    #[must_use]
    pub fn latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    #[must_use]
    pub fn source(mut self, source: SeedSource, serialized: bool) -> Self {
        self.source = source;
        self.serialized = serialized;
        self
    }

    pub(crate) fn truncated(&self) -> bool {
        self.params.truncated() || self.response.truncated()
    }
}

/// One stored seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedRecord {
    pub client: u32,
    pub object: u32,
    pub command: u32,
    pub params: BoundedPayload,
    pub ctrl_flags: u32,
    pub access_right: u32,
    pub timestamp_ns: u64,
    pub gpu_instance: u32,
    pub offloaded: bool,
    pub response_status: u32,
    pub response: BoundedPayload,
    pub latency_us: u64,
    pub sequence: u64,
    pub source: SeedSource,
    pub serialized: bool,
}

impl SeedRecord {
    /// Empty slot contents. Does not allocate.
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub(crate) fn from_capture(capture: SeedCapture, timestamp_ns: u64, sequence: u64) -> Self {
        let SeedCapture {
            site,
            params,
            response_status,
            response,
            latency_us,
            source,
            serialized,
        } = capture;
        Self {
            client: site.client,
            object: site.object,
            command: site.command,
            params,
            ctrl_flags: site.ctrl_flags,
            access_right: site.access_right,
            timestamp_ns,
            gpu_instance: site.gpu_instance,
            offloaded: site.offloaded,
            response_status,
            response,
            latency_us,
            sequence,
            source,
            serialized,
        }
    }

    pub(crate) fn scrub(&mut self) {
        let mut params = std::mem::take(&mut self.params);
        let mut response = std::mem::take(&mut self.response);
        params.scrub();
        response.scrub();
        *self = Self {
            params,
            response,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_within_bound_is_exact() {
        let p = BoundedPayload::capture(&[1, 2, 3]);
        assert_eq!(p.as_slice(), &[1, 2, 3]);
        assert!(!p.truncated());
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn capture_at_bound_is_not_truncated() {
        let bytes = vec![0xAB; MAX_PARAMS_SIZE];
        let p = BoundedPayload::capture(&bytes);
        assert_eq!(p.len(), MAX_PARAMS_SIZE);
        assert!(!p.truncated());
    }

    #[test]
    fn capture_over_bound_is_clamped_and_flagged() {
        let bytes: Vec<u8> = (0..MAX_PARAMS_SIZE + 17).map(|i| i as u8).collect();
        let p = BoundedPayload::capture(&bytes);
        assert_eq!(p.len(), MAX_PARAMS_SIZE);
        assert!(p.truncated());
        assert_eq!(p.as_slice(), &bytes[..MAX_PARAMS_SIZE]);
    }

    #[test]
    fn from_parts_clamps() {
        let p = BoundedPayload::from_parts(vec![1; MAX_PARAMS_SIZE + 1], false);
        assert!(p.truncated());
        assert_eq!(p.len(), MAX_PARAMS_SIZE);
    }

    #[test]
    fn source_labels() {
        assert_eq!(SeedSource::HOOK1_PROLOGUE.label(), "Hook1");
        assert_eq!(
            (SeedSource::HOOK2_RPC | SeedSource::HOOK2_BYPASS | SeedSource::SERIALIZED).label(),
            "Hook2-Bypass"
        );
        assert_eq!((SeedSource::HOOK2_RPC | SeedSource::HOOK2_INTERNAL).label(), "Hook2-Internal");
        assert_eq!(SeedSource::HOOK2_RPC.label(), "Hook2");
        assert_eq!(SeedSource::empty().label(), "Unknown");
    }

    #[test]
    fn record_takes_identity_from_site() {
        let site = CallSite::new(0xC1, 0x0B, 0x2080_0122).rpc().gpu_instance(2).ctrl(4, 5);
        let capture = SeedCapture::new(site, &[9, 9])
            .response(0x55, &[1])
            .latency_us(12);
        let rec = SeedRecord::from_capture(capture, 1_000, 7);
        assert_eq!((rec.client, rec.object, rec.command), (0xC1, 0x0B, 0x2080_0122));
        assert_eq!((rec.ctrl_flags, rec.access_right, rec.gpu_instance), (4, 5, 2));
        assert!(rec.offloaded);
        assert_eq!(rec.response_status, 0x55);
        assert_eq!(rec.response.as_slice(), &[1]);
        assert_eq!((rec.timestamp_ns, rec.latency_us, rec.sequence), (1_000, 12, 7));
        assert_eq!(rec.source, SeedSource::HOOK1_PROLOGUE);
    }

    #[test]
    fn scrub_keeps_nothing_visible() {
        let capture = SeedCapture::new(CallSite::new(1, 2, 3), &[7; 32]);
        let mut rec = SeedRecord::from_capture(capture, 5, 6);
        rec.scrub();
        assert_eq!(rec, SeedRecord::zeroed());
    }
}
