//! Seed-path overhead benchmarks.
//!
//! Measures the per-call cost of storing a seed, extracting a window, and the
//! Hook 1 / Hook 2 dedup handshake.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use seedhook_engine::{
    CallSite, HookConfig, HookFlags, ManualClock, SeedCapture, SeedHook, XorShiftEntropy,
};

#[derive(Default)]
struct BenchStats {
    samples_ns_per_op: Vec<f64>,
    total_iters: u64,
    total_ns: u128,
}

impl BenchStats {
    fn record(&mut self, iters: u64, dur: Duration) {
        let ns = dur.as_nanos();
        self.total_iters = self.total_iters.saturating_add(iters);
        self.total_ns = self.total_ns.saturating_add(ns);
        self.samples_ns_per_op.push(ns as f64 / iters as f64);
    }

    fn report(&self, bench_label: &str, payload: usize) {
        let mut samples = self.samples_ns_per_op.clone();
        if samples.is_empty() {
            return;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let p50 = percentile_sorted(&samples, 0.50);
        let p99 = percentile_sorted(&samples, 0.99);
        let throughput_ops_s = if self.total_ns == 0 {
            0.0
        } else {
            (self.total_iters as f64) / (self.total_ns as f64 / 1e9)
        };

        println!(
            "SEEDHOOK_BENCH bench={bench_label} payload={payload} samples={} p50_ns_op={p50:.3} p99_ns_op={p99:.3} throughput_ops_s={throughput_ops_s:.3}",
            samples.len(),
        );
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn engine(flags: HookFlags, capacity: u32) -> SeedHook {
    let hook = SeedHook::with_sources(
        HookConfig::with_flags(flags).capacity(capacity),
        Arc::new(ManualClock::new(1_000)),
        Arc::new(XorShiftEntropy::new(0xBEEF)),
    );
    hook.init().expect("init");
    hook
}

fn bench_seed_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("seed_path");
    group.throughput(Throughput::Elements(1));

    for payload in [64_usize, 4096] {
        let hook = engine(
            HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::RECORD_RESPONSE,
            256,
        );
        let params = vec![0xA5_u8; payload];
        let site = CallSite::new(1, 2, 0x2080_0101).rpc();

        let stats = RefCell::new(BenchStats::default());
        group.bench_function(BenchmarkId::new("record_seed", payload), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    let capture = SeedCapture::new(site, &params).response(0, &params);
                    black_box(hook.record_seed(capture).ok());
                }
                let dur = start.elapsed().max(Duration::from_nanos(1));
                stats.borrow_mut().record(iters, dur);
                dur
            });
        });
        stats.borrow().report("record_seed", payload);

        let stats = RefCell::new(BenchStats::default());
        group.bench_function(BenchmarkId::new("copy_seeds_16", payload), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    black_box(hook.copy_seeds(0, 16, 16));
                }
                let dur = start.elapsed().max(Duration::from_nanos(1));
                stats.borrow_mut().record(iters, dur);
                dur
            });
        });
        stats.borrow().report("copy_seeds_16", payload);
    }

    {
        let hook = engine(HookFlags::ENABLED | HookFlags::HOOK2_ENABLED, 0);
        let stats = RefCell::new(BenchStats::default());
        group.bench_function("dedup_mark_check", |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for i in 0..iters {
                    let cmd = (i & 0xFF) as u32;
                    hook.mark_from_prologue(1, 2, cmd);
                    black_box(hook.is_marked_from_prologue(1, 2, cmd));
                }
                let dur = start.elapsed().max(Duration::from_nanos(1));
                stats.borrow_mut().record(iters, dur);
                dur
            });
        });
        stats.borrow().report("dedup_mark_check", 0);
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(1))
        .measurement_time(Duration::from_secs(2))
        .sample_size(50);
    targets = bench_seed_path
);
criterion_main!(benches);
