//! Logged control requests against an in-process dispatcher.

use std::sync::Arc;
use std::time::Instant;

use seedhook_control::{
    CallerPrivilege, ConfigWire, ControlDispatcher, ControlRequest, GetSeedsWire,
    MAX_SEEDS_PER_REQUEST, RECORD_WIRE_SIZE, SeedRecordWire, SubCommand, VecUserMemory,
};
use seedhook_engine::{HookStats, SeedHook, SeedRecord};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogLevel, Outcome};

/// Caller address used for `GET_SEEDS` destination buffers.
const STAGING_ADDR: u64 = 0x7000_0000;

/// Records per `GET_SEEDS` request made by [`ControlClient::fetch_all`].
pub const FETCH_BATCH: u32 = 32;

/// Issues control requests the way a user-space tool would.
pub struct ControlClient {
    dispatcher: ControlDispatcher,
    caller: Box<dyn CallerPrivilege>,
    memory: VecUserMemory,
    log: Option<LogEmitter>,
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("dispatcher", &self.dispatcher)
            .field("admin", &self.caller.is_admin())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl ControlClient {
    pub fn new(hook: Arc<SeedHook>, caller: impl CallerPrivilege + 'static) -> Self {
        Self {
            dispatcher: ControlDispatcher::new(hook),
            caller: Box::new(caller),
            memory: VecUserMemory::new(),
            log: None,
        }
    }

    #[must_use]
    pub fn with_log(mut self, log: LogEmitter) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log_mut(&mut self) -> Option<&mut LogEmitter> {
        self.log.as_mut()
    }

    /// Give back the emitter, flushed.
    pub fn into_log(mut self) -> Result<Option<LogEmitter>, HarnessError> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(self.log)
    }

    fn call(
        &mut self,
        mut request: ControlRequest,
        details: serde_json::Value,
    ) -> Result<ControlRequest, HarnessError> {
        let name = SubCommand::try_from(request.subcmd)
            .map(SubCommand::name)
            .ok();
        let start = Instant::now();
        let result = self
            .dispatcher
            .handle(&*self.caller, &mut request, &mut self.memory);
        let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        if let Some(log) = self.log.as_mut() {
            let level = if result.is_ok() {
                LogLevel::Info
            } else {
                LogLevel::Warn
            };
            let mut entry = log
                .entry(level, "control_request")
                .with_latency_us(latency_us);
            if let Some(name) = name {
                entry = entry.with_subcommand(name);
            }
            if !details.is_null() {
                entry = entry.with_details(details);
            }
            entry = match &result {
                Ok(_) => entry.with_outcome(Outcome::Ok),
                Err(err) => entry.with_outcome(Outcome::Error).with_errno(err.errno()),
            };
            log.emit_entry(entry)?;
        }

        result?;
        Ok(request)
    }

    pub fn get_config(&mut self) -> Result<ConfigWire, HarnessError> {
        let reply = self.call(
            ControlRequest::new(SubCommand::GetConfig as u32),
            serde_json::Value::Null,
        )?;
        Ok(reply.config())
    }

    pub fn set_config(&mut self, config: &ConfigWire) -> Result<(), HarnessError> {
        self.call(
            ControlRequest::with_config(SubCommand::SetConfig, config),
            serde_json::json!({
                "flags": config.flags,
                "capacity": config.capacity,
                "probability": config.probability,
            }),
        )?;
        Ok(())
    }

    pub fn get_stats(&mut self) -> Result<HookStats, HarnessError> {
        let reply = self.call(
            ControlRequest::new(SubCommand::GetStats as u32),
            serde_json::Value::Null,
        )?;
        Ok(reply.stats())
    }

    pub fn clear_stats(&mut self) -> Result<(), HarnessError> {
        self.call(
            ControlRequest::new(SubCommand::ClearStats as u32),
            serde_json::Value::Null,
        )?;
        Ok(())
    }

    /// One `GET_SEEDS` request for up to `count` records from `start`.
    pub fn get_seeds(&mut self, start: u32, count: u32) -> Result<Vec<SeedRecord>, HarnessError> {
        let count = count.clamp(1, MAX_SEEDS_PER_REQUEST);
        let bytes = count as usize * RECORD_WIRE_SIZE;
        self.memory.map(STAGING_ADDR, bytes);
        let args = GetSeedsWire {
            start_index: start,
            count,
            dest_addr: STAGING_ADDR,
            dest_capacity_bytes: u32::try_from(bytes).unwrap_or(u32::MAX),
            actual_count: 0,
        };
        let reply = self.call(
            ControlRequest::with_get_seeds(&args),
            serde_json::json!({ "start": start, "count": count }),
        )?;

        let actual = reply.get_seeds().actual_count as usize;
        let region = self.memory.region(STAGING_ADDR).unwrap_or_default();
        let seeds = region
            .chunks_exact(RECORD_WIRE_SIZE)
            .take(actual)
            .map(SeedRecordWire::decode)
            .collect::<Result<Vec<_>, _>>()?;
        self.memory.map(STAGING_ADDR, 0);
        Ok(seeds)
    }

    /// Drain every available seed, oldest first, in [`FETCH_BATCH`] chunks.
    ///
    /// Stops at the first short batch. Concurrent writers may shift the
    /// window between batches.
    pub fn fetch_all(&mut self) -> Result<Vec<SeedRecord>, HarnessError> {
        let mut seeds = Vec::new();
        loop {
            let start = u32::try_from(seeds.len()).unwrap_or(u32::MAX);
            let batch = self.get_seeds(start, FETCH_BATCH)?;
            let done = batch.len() < FETCH_BATCH as usize;
            seeds.extend(batch);
            if done {
                return Ok(seeds);
            }
        }
    }

    /// Drain seeds with a sequence above `after` (all of them for `None`).
    ///
    /// The result is strictly increasing by sequence; records repeated by a
    /// window shift between batches are dropped.
    pub fn fetch_since(&mut self, after: Option<u64>) -> Result<Vec<SeedRecord>, HarnessError> {
        let mut last = after;
        let mut fresh = Vec::new();
        for seed in self.fetch_all()? {
            if last.is_none_or(|l| seed.sequence > l) {
                last = Some(seed.sequence);
                fresh.push(seed);
            }
        }
        Ok(fresh)
    }
}
