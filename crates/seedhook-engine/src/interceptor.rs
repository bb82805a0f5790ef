//! Control-path interceptor.
//!
//! [`ControlInterceptor`] wraps one control call the way the host driver
//! does: snapshot the request, run the Hook 1 prologue, dispatch the (possibly
//! mutated) parameters, then record the seed with the *original* request.
//! Hook 2 lives below the transport seam; [`SimulatedTransport`] drives it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::SeedHook;
use crate::record::{BoundedPayload, CallSite};

/// The RPC transport below the control path.
///
/// Responses are written back into `params`, as the firmware does.
pub trait RpcTransport: Send + Sync {
    /// Send an offloaded call. Implementations that model the serialization
    /// layer are expected to run Hook 2.
    fn rpc(&self, hook: &SeedHook, site: &CallSite, params: &mut [u8]) -> u32;

    /// Handle a call that stays on the local path. Defaults to success.
    fn local(&self, _site: &CallSite, _params: &mut [u8]) -> u32 {
        0
    }
}

/// Result of one intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptOutcome {
    pub status: u32,
    /// The transport received a mutated copy.
    pub mutated: bool,
    pub latency_us: u64,
    /// Sequence of the Hook 1 seed, if one was stored.
    pub sequence: Option<u64>,
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Composes the Hook 1 entry points around a transport.
#[derive(Debug, Clone)]
pub struct ControlInterceptor {
    hook: Arc<SeedHook>,
}

impl ControlInterceptor {
    #[must_use]
    pub fn new(hook: Arc<SeedHook>) -> Self {
        Self { hook }
    }

    #[must_use]
    pub fn hook(&self) -> &Arc<SeedHook> {
        &self.hook
    }

    /// Run one control call through the hooks.
    pub fn intercept<T: RpcTransport + ?Sized>(
        &self,
        site: &CallSite,
        params: &mut [u8],
        transport: &T,
    ) -> InterceptOutcome {
        let hook = &*self.hook;
        let original = hook
            .is_enabled()
            .then(|| BoundedPayload::capture(params));
        let mut mutated = hook.hook1_prologue(site, params);

        if !site.is_rpc_path() {
            return InterceptOutcome {
                status: transport.local(site, params),
                mutated: false,
                latency_us: 0,
                sequence: None,
            };
        }

        let start = Instant::now();
        let status = match mutated.as_mut() {
            Some(copy) => transport.rpc(hook, site, copy),
            None => transport.rpc(hook, site, params),
        };
        let latency_us = elapsed_us(start);

        // A response to mutated input does not belong with the original request.
        let response = if hook.is_response_recording_enabled() && mutated.is_none() {
            BoundedPayload::capture(params)
        } else {
            BoundedPayload::default()
        };
        let was_mutated = mutated.is_some();

        let sequence = original.and_then(|original| {
            hook.hook1_response(site, original, status, response.as_slice(), latency_us)
        });

        InterceptOutcome {
            status,
            mutated: was_mutated,
            latency_us,
            sequence,
        }
    }
}

type Responder = Box<dyn Fn(&CallSite, &mut [u8]) + Send + Sync>;

/// In-process stand-in for the serialization layer and firmware.
///
/// Each `rpc` call asks the dedup correlator whether Hook 1 saw the call,
/// classifies it through Hook 2, lets the responder fill in the response, and
/// hands the request/response pair to `hook2_response`.
pub struct SimulatedTransport {
    serialized: bool,
    internal: bool,
    status: u32,
    responder: Option<Responder>,
}

impl fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("serialized", &self.serialized)
            .field("internal", &self.internal)
            .field("status", &self.status)
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    /// Serialized, user-originated calls answered with status 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            serialized: true,
            internal: false,
            status: 0,
            responder: None,
        }
    }

    #[must_use]
    pub fn serialized(mut self, serialized: bool) -> Self {
        self.serialized = serialized;
        self
    }

    /// Treat calls as driver-internal (no user context).
    #[must_use]
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    #[must_use]
    pub fn status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    /// Rewrite the parameter buffer in place to model the firmware response.
    #[must_use]
    pub fn responder(mut self, f: impl Fn(&CallSite, &mut [u8]) + Send + Sync + 'static) -> Self {
        self.responder = Some(Box::new(f));
        self
    }
}

impl RpcTransport for SimulatedTransport {
    fn rpc(&self, hook: &SeedHook, site: &CallSite, params: &mut [u8]) -> u32 {
        let from_prologue = hook.is_marked_from_prologue(site.client, site.object, site.command);
        let class = hook.hook2_dispatch(site, self.serialized, from_prologue, self.internal);
        let request = class.map(|_| params.to_vec());

        let start = Instant::now();
        if let Some(respond) = &self.responder {
            respond(site, params);
        }
        let latency_us = elapsed_us(start);

        if let (Some(class), Some(request)) = (class, request) {
            hook.hook2_response(
                site,
                &request,
                self.serialized,
                self.status,
                params,
                latency_us,
                class.seed_source(self.serialized),
            );
        }
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{HookConfig, HookFlags};
    use crate::entropy::XorShiftEntropy;
    use crate::record::SeedSource;

    fn hook(flags: HookFlags, probability: u32) -> Arc<SeedHook> {
        let hook = SeedHook::with_sources(
            HookConfig::with_flags(flags).capacity(32).mutation_probability(probability),
            Arc::new(ManualClock::new(5_000)),
            Arc::new(XorShiftEntropy::new(11)),
        );
        hook.init().expect("init");
        Arc::new(hook)
    }

    fn echo_plus_one() -> SimulatedTransport {
        SimulatedTransport::new().responder(|_, params| {
            for b in params.iter_mut() {
                *b = b.wrapping_add(1);
            }
        })
    }

    #[test]
    fn rpc_call_records_once_through_both_hooks() {
        let hook = hook(
            HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::RECORD_RESPONSE | HookFlags::HOOK2_ENABLED,
            0,
        );
        let interceptor = ControlInterceptor::new(Arc::clone(&hook));
        let site = CallSite::new(1, 2, 0x2080_0101).rpc();
        let mut params = [10_u8, 20, 30];
        let outcome = interceptor.intercept(&site, &mut params, &echo_plus_one());

        assert_eq!(outcome.status, 0);
        assert!(!outcome.mutated);
        assert_eq!(outcome.sequence, Some(0));
        assert_eq!(params, [11, 21, 31]);

        let stats = hook.get_stats();
        assert_eq!(stats.rpc_hooks, 1);
        assert_eq!(stats.hook2_total_hooks, 1);
        assert_eq!(stats.hook2_duplicates, 1);
        assert_eq!(stats.seed_records, 1);
        assert_eq!(stats.hook2_seed_records, 0);

        let rec = &hook.copy_seeds(0, 1, 1)[0];
        assert_eq!(rec.params.as_slice(), &[10, 20, 30]);
        assert_eq!(rec.response.as_slice(), &[11, 21, 31]);
        assert_eq!(rec.source, SeedSource::HOOK1_PROLOGUE);
    }

    #[test]
    fn bypass_rpc_is_recorded_by_hook2() {
        let hook = hook(
            HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::HOOK2_ENABLED,
            0,
        );
        let transport = echo_plus_one();
        let site = CallSite::new(3, 4, 5).rpc();
        let mut params = [1_u8, 2];
        transport.rpc(&hook, &site, &mut params);

        let stats = hook.get_stats();
        assert_eq!((stats.hook2_bypass_hooks, stats.hook2_serialized_hooks), (1, 1));
        assert_eq!(stats.hook2_seed_records, 1);
        let rec = &hook.copy_seeds(0, 1, 1)[0];
        assert_eq!(
            rec.source,
            SeedSource::HOOK2_RPC | SeedSource::HOOK2_BYPASS | SeedSource::SERIALIZED
        );
        assert_eq!(rec.params.as_slice(), &[1, 2]);
        assert!(rec.serialized);
    }

    #[test]
    fn mutated_call_records_original_without_response() {
        let hook = hook(
            HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::RECORD_RESPONSE | HookFlags::INLINE_FUZZ,
            100,
        );
        let interceptor = ControlInterceptor::new(Arc::clone(&hook));
        let site = CallSite::new(1, 1, 1).rpc();
        let mut params = [0_u8; 16];
        let outcome = interceptor.intercept(&site, &mut params, &echo_plus_one());

        assert!(outcome.mutated);
        // The caller's buffer was not sent, so it holds no response.
        assert_eq!(params, [0; 16]);
        let rec = &hook.copy_seeds(0, 1, 1)[0];
        assert_eq!(rec.params.as_slice(), &[0; 16]);
        assert!(rec.response.is_empty());
        assert_eq!(hook.get_stats().inline_fuzz_count, 1);
    }

    #[test]
    fn local_calls_are_counted_not_recorded() {
        let hook = hook(HookFlags::ENABLED | HookFlags::RECORD_SEED, 0);
        let interceptor = ControlInterceptor::new(Arc::clone(&hook));
        let outcome = interceptor.intercept(&CallSite::new(1, 1, 1), &mut [1, 2], &echo_plus_one());
        assert_eq!(outcome.sequence, None);
        let stats = hook.get_stats();
        assert_eq!((stats.local_hooks, stats.seed_records), (1, 0));
    }

    #[test]
    fn disabled_hook_passes_through() {
        let hook = hook(HookFlags::RECORD_SEED | HookFlags::HOOK2_ENABLED, 0);
        let interceptor = ControlInterceptor::new(Arc::clone(&hook));
        let mut params = [7_u8];
        let outcome = interceptor.intercept(
            &CallSite::new(1, 1, 1).rpc(),
            &mut params,
            &echo_plus_one().status(0x57),
        );
        assert_eq!(outcome.status, 0x57);
        assert_eq!(params, [8]);
        assert_eq!(hook.get_stats(), crate::stats::HookStats::default());
    }
}
