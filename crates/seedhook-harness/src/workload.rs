//! Synthetic control-path workload.
//!
//! Each worker issues a deterministic mix of calls: RPC-path calls through the
//! full interceptor (Hook 1 then Hook 2), local calls that never reach the
//! transport, and driver-internal RPCs that only Hook 2 sees.

use std::sync::Arc;
use std::thread;

use serde::Serialize;

use seedhook_engine::{CallSite, ControlInterceptor, RpcTransport, SeedHook, SimulatedTransport};

use crate::error::HarnessError;

/// Shape of a synthetic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadConfig {
    pub threads: usize,
    pub calls_per_thread: usize,
    /// Percent of calls handled on the local path.
    pub local_percent: u32,
    /// Percent of calls issued internally, below Hook 1.
    pub internal_percent: u32,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            calls_per_thread: 256,
            local_percent: 20,
            internal_percent: 10,
            seed: 0x5EED_CAFE,
        }
    }
}

/// What the workers did, counted on the caller side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadReport {
    pub calls: u64,
    pub rpc_calls: u64,
    pub local_calls: u64,
    pub internal_calls: u64,
    /// RPC calls whose parameters were replaced by a mutated copy.
    pub mutated: u64,
    /// Hook 1 seeds stored (sequence returned to the interceptor).
    pub hook1_seeds: u64,
}

impl WorkloadReport {
    fn merge(&mut self, other: &Self) {
        self.calls += other.calls;
        self.rpc_calls += other.rpc_calls;
        self.local_calls += other.local_calls;
        self.internal_calls += other.internal_calls;
        self.mutated += other.mutated;
        self.hook1_seeds += other.hook1_seeds;
    }
}

/// Command ids used by the workload: `class << 16 | method`.
const COMMANDS: [u32; 6] = [
    0x0000_0102,
    0x2080_0100,
    0x2080_0123,
    0x2080_1400,
    0x0080_0201,
    0x9096_0101,
];

struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

fn respond(site: &CallSite, params: &mut [u8]) {
    let key = site.command.to_le_bytes();
    for (i, b) in params.iter_mut().enumerate() {
        *b ^= key[i % 4] | 1;
    }
}

fn worker(hook: Arc<SeedHook>, cfg: WorkloadConfig, index: usize) -> WorkloadReport {
    let mut rng = Rng::new(cfg.seed ^ (index as u64).wrapping_mul(0xA24B_AED4_963E_E407));
    let interceptor = ControlInterceptor::new(Arc::clone(&hook));
    let transport = SimulatedTransport::new().responder(respond);
    let internal = SimulatedTransport::new().internal(true).responder(respond);
    let client = 0xC1D0_0000 | index as u32;

    let mut report = WorkloadReport::default();
    for call in 0..cfg.calls_per_thread {
        let command = COMMANDS[rng.below(COMMANDS.len() as u64) as usize];
        let len = 4 + rng.below(60) as usize;
        let mut params: Vec<u8> = (0..len).map(|_| rng.next_u64() as u8).collect();
        let object = 0x5C00_0000 | call as u32;
        let roll = rng.below(100) as u32;
        report.calls += 1;

        if roll < cfg.internal_percent {
            let site = CallSite::new(0, object, command).rpc();
            internal.rpc(&hook, &site, &mut params);
            report.internal_calls += 1;
            continue;
        }

        let mut site = CallSite::new(client, object, command).ctrl(0x1, 0x2);
        if roll >= cfg.internal_percent.saturating_add(cfg.local_percent) {
            site = site.rpc();
        }
        let outcome = interceptor.intercept(&site, &mut params, &transport);
        if site.is_rpc_path() {
            report.rpc_calls += 1;
        } else {
            report.local_calls += 1;
        }
        if outcome.mutated {
            report.mutated += 1;
        }
        if outcome.sequence.is_some() {
            report.hook1_seeds += 1;
        }
    }
    report
}

/// Run the workload against an initialized engine and wait for all workers.
pub fn run_workload(hook: &Arc<SeedHook>, cfg: WorkloadConfig) -> Result<WorkloadReport, HarnessError> {
    let handles: Vec<_> = (0..cfg.threads.max(1))
        .map(|index| {
            let hook = Arc::clone(hook);
            thread::spawn(move || worker(hook, cfg, index))
        })
        .collect();

    let mut total = WorkloadReport::default();
    for handle in handles {
        let report = handle.join().map_err(|_| HarnessError::WorkerPanic)?;
        total.merge(&report);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedhook_engine::{HookConfig, HookFlags};

    fn engine(flags: HookFlags) -> Arc<SeedHook> {
        let hook = SeedHook::with_config(HookConfig::with_flags(flags).capacity(4096));
        hook.init().unwrap();
        Arc::new(hook)
    }

    #[test]
    fn counts_add_up() {
        let hook = engine(HookFlags::all());
        let cfg = WorkloadConfig {
            threads: 3,
            calls_per_thread: 100,
            ..WorkloadConfig::default()
        };
        let report = run_workload(&hook, cfg).unwrap();
        assert_eq!(report.calls, 300);
        assert_eq!(
            report.rpc_calls + report.local_calls + report.internal_calls,
            report.calls
        );

        let stats = hook.get_stats();
        assert_eq!(stats.total_hooks, report.rpc_calls + report.local_calls);
        assert_eq!(stats.rpc_hooks, report.rpc_calls);
        assert_eq!(stats.local_hooks, report.local_calls);
        assert_eq!(stats.hook2_total_hooks, report.rpc_calls + report.internal_calls);
        assert_eq!(stats.hook2_internal_hooks, report.internal_calls);
        assert_eq!(stats.inline_fuzz_count, report.mutated);
        assert!(stats.classification_balanced());
        assert_eq!(stats.seed_records, report.hook1_seeds + stats.hook2_seed_records);
    }

    #[test]
    fn disabled_engine_sees_nothing() {
        let hook = engine(HookFlags::empty());
        let report = run_workload(&hook, WorkloadConfig::default()).unwrap();
        assert_eq!(report.hook1_seeds, 0);
        assert_eq!(report.mutated, 0);
        assert_eq!(hook.get_stats(), Default::default());
    }

    #[test]
    fn rng_is_deterministic() {
        let mut a = Rng::new(9);
        let mut b = Rng::new(9);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_ne!(Rng::new(0).next_u64(), 0);
    }
}
