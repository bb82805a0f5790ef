use seedhook_engine::{CallSite, HookConfig, HookFlags, SeedCapture, SeedHook};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

fn config(capacity: u32) -> HookConfig {
    HookConfig::with_flags(HookFlags::ENABLED | HookFlags::RECORD_SEED).capacity(capacity)
}

/// Reference model: the last `capacity` sequences since the ring was installed.
struct Model {
    capacity: usize,
    window: VecDeque<u64>,
    next_seq: u64,
}

impl Model {
    fn push(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(seq);
        seq
    }
}

#[test]
fn extraction_matches_reference_model() {
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 3_000;
    const CAPACITIES: [u32; 4] = [1, 3, 7, 16];

    for seed in SEEDS {
        let mut rng = XorShift64::new(seed);
        let hook = SeedHook::with_config(config(CAPACITIES[0]));
        hook.init().expect("init");
        let mut model = Model {
            capacity: CAPACITIES[0] as usize,
            window: VecDeque::new(),
            next_seq: 0,
        };

        for step in 0..STEPS {
            match rng.gen_range_usize(0, 99) {
                0..=69 => {
                    let expected = model.push();
                    let site = CallSite::new(1, 2, step as u32);
                    let got = hook
                        .record_seed(SeedCapture::new(site, &[step as u8]))
                        .expect("record");
                    assert_eq!(got, Some(expected), "seed={seed} step={step}: sequence");
                }
                70..=89 => {
                    let start = rng.gen_range_usize(0, model.capacity + 1);
                    let requested = rng.gen_range_usize(0, model.capacity + 2);
                    let dest = rng.gen_range_usize(0, model.capacity + 2);
                    let got: Vec<u64> = hook
                        .copy_seeds(start, requested, dest)
                        .iter()
                        .map(|r| r.sequence)
                        .collect();
                    let expected: Vec<u64> = model
                        .window
                        .iter()
                        .copied()
                        .skip(start)
                        .take(requested.min(dest))
                        .collect();
                    assert_eq!(
                        got, expected,
                        "seed={seed} step={step}: window start={start} requested={requested} dest={dest}"
                    );
                }
                90..=95 => {
                    let capacity = CAPACITIES[rng.gen_range_usize(0, CAPACITIES.len() - 1)];
                    hook.set_config(config(capacity)).expect("set_config");
                    if capacity as usize != model.capacity {
                        model.capacity = capacity as usize;
                        model.window.clear();
                    }
                }
                _ => {
                    hook.clear_stats();
                    model.window.clear();
                    model.next_seq = 0;
                }
            }

            assert_eq!(
                hook.available_seeds(),
                model.window.len(),
                "seed={seed} step={step}: available"
            );
            assert_eq!(
                hook.get_stats().seed_records,
                model.next_seq,
                "seed={seed} step={step}: seed_records"
            );
        }
    }
}

#[test]
fn overwrite_returns_last_capacity_records_in_order() {
    const C: usize = 5;
    for k in [0_usize, 1, 4, 5, 13] {
        let hook = SeedHook::with_config(config(C as u32));
        hook.init().expect("init");
        for cmd in 0..(C + k) as u32 {
            hook.record_seed(SeedCapture::new(CallSite::new(0, 0, cmd), &[]))
                .expect("record");
        }
        let cmds: Vec<u32> = hook.copy_seeds(0, C, C).iter().map(|r| r.command).collect();
        let expected: Vec<u32> = (k as u32..(C + k) as u32).collect();
        assert_eq!(cmds, expected, "k={k}");
        assert!(hook.copy_seeds(C, C, C).is_empty(), "k={k}");
    }
}
