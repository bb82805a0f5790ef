//! Periodic stats polling with incremental seed collection.
//!
//! Each poll reads the counters and keeps only seeds newer than the last one
//! already collected, so a seed is saved at most once across polls.

use serde::Serialize;

use seedhook_engine::{HookStats, SeedRecord};

use crate::client::ControlClient;
use crate::error::HarnessError;
use crate::structured_log::{LogLevel, Outcome};

/// Result of one [`Monitor::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorPoll {
    pub poll: usize,
    pub stats: HookStats,
    pub new_seeds: usize,
    pub last_sequence: Option<u64>,
}

#[derive(Debug, Default)]
pub struct Monitor {
    polls: usize,
    last_sequence: Option<u64>,
    collected: Vec<SeedRecord>,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    #[must_use]
    pub fn collected(&self) -> &[SeedRecord] {
        &self.collected
    }

    #[must_use]
    pub fn into_seeds(self) -> Vec<SeedRecord> {
        self.collected
    }

    /// Read stats, then fetch and keep seeds newer than the last collected.
    ///
    /// A counter rewind (`seed_records` at or below the last sequence, as
    /// after `CLEAR_STATS`) restarts collection from the oldest seed.
    pub fn poll(&mut self, client: &mut ControlClient) -> Result<MonitorPoll, HarnessError> {
        let stats = client.get_stats()?;
        if self.last_sequence.is_some_and(|last| stats.seed_records <= last) {
            self.last_sequence = None;
        }

        let fresh = client.fetch_since(self.last_sequence)?;
        if let Some(seed) = fresh.last() {
            self.last_sequence = Some(seed.sequence);
        }
        let new_seeds = fresh.len();
        self.collected.extend(fresh);
        self.polls += 1;

        let result = MonitorPoll {
            poll: self.polls,
            stats,
            new_seeds,
            last_sequence: self.last_sequence,
        };
        if let Some(log) = client.log_mut() {
            let entry = log
                .entry(LogLevel::Info, "monitor_poll")
                .with_outcome(Outcome::Ok)
                .with_details(serde_json::to_value(result)?);
            log.emit_entry(entry)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedhook_control::StaticPrivilege;
    use seedhook_engine::{CallSite, HookConfig, HookFlags, SeedCapture, SeedHook};
    use std::sync::Arc;

    fn client(capacity: u32) -> (Arc<SeedHook>, ControlClient) {
        let hook = SeedHook::with_config(
            HookConfig::with_flags(HookFlags::ENABLED | HookFlags::RECORD_SEED).capacity(capacity),
        );
        hook.init().expect("init");
        let hook = Arc::new(hook);
        let client = ControlClient::new(Arc::clone(&hook), StaticPrivilege::ADMIN);
        (hook, client)
    }

    fn record(hook: &SeedHook, cmds: std::ops::Range<u32>) {
        for cmd in cmds {
            hook.record_seed(SeedCapture::new(CallSite::new(1, 2, cmd), &[cmd as u8]))
                .expect("record");
        }
    }

    #[test]
    fn polls_collect_each_seed_once() {
        let (hook, mut client) = client(64);
        let mut monitor = Monitor::new();

        record(&hook, 0..5);
        let first = monitor.poll(&mut client).expect("poll");
        assert_eq!(first.new_seeds, 5);
        assert_eq!(first.last_sequence, Some(4));

        let idle = monitor.poll(&mut client).expect("poll");
        assert_eq!(idle.new_seeds, 0);

        record(&hook, 5..8);
        let next = monitor.poll(&mut client).expect("poll");
        assert_eq!(next.new_seeds, 3);
        assert_eq!(next.poll, 3);
        assert_eq!(next.stats.seed_records, 8);

        let seqs: Vec<u64> = monitor.collected().iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn overwritten_seeds_are_skipped_not_repeated() {
        let (hook, mut client) = client(4);
        let mut monitor = Monitor::new();
        record(&hook, 0..3);
        monitor.poll(&mut client).expect("poll");

        record(&hook, 3..10);
        let poll = monitor.poll(&mut client).expect("poll");
        assert_eq!(poll.new_seeds, 4);
        let seqs: Vec<u64> = monitor.collected().iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 6, 7, 8, 9]);
    }

    #[test]
    fn cleared_counters_restart_collection() {
        let (hook, mut client) = client(16);
        let mut monitor = Monitor::new();
        record(&hook, 0..6);
        monitor.poll(&mut client).expect("poll");

        client.clear_stats().expect("clear");
        record(&hook, 0..2);
        let poll = monitor.poll(&mut client).expect("poll");
        assert_eq!(poll.new_seeds, 2);
        assert_eq!(poll.last_sequence, Some(1));
        assert_eq!(monitor.into_seeds().len(), 8);
    }
}
