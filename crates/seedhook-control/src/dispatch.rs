//! Control request dispatch.
//!
//! Order of checks for every request:
//! 1. caller privilege (nothing else is looked at without it)
//! 2. request decoding / subcommand
//! 3. subcommand-specific argument validation
//! 4. engine state

use std::sync::Arc;

use seedhook_engine::{SeedHook, SeedRecord};

use crate::error::ControlError;
use crate::memory::UserMemory;
use crate::privilege::CallerPrivilege;
use crate::wire::{
    ConfigWire, ControlRequest, MAX_SEEDS_PER_REQUEST, RECORD_WIRE_SIZE, SeedRecordWire, SubCommand,
};

/// Serves control requests against one engine.
#[derive(Debug, Clone)]
pub struct ControlDispatcher {
    hook: Arc<SeedHook>,
}

impl ControlDispatcher {
    #[must_use]
    pub fn new(hook: Arc<SeedHook>) -> Self {
        Self { hook }
    }

    #[must_use]
    pub fn hook(&self) -> &Arc<SeedHook> {
        &self.hook
    }

    /// Raw entry point: decode `buf`, handle it, and write the reply back in
    /// place. Returns 0 or a negated errno.
    pub fn handle_bytes(
        &self,
        caller: &dyn CallerPrivilege,
        buf: &mut [u8],
        memory: &mut dyn UserMemory,
    ) -> i32 {
        let result = (|| {
            if !caller.is_admin() {
                return Err(ControlError::PermissionDenied);
            }
            let mut request = ControlRequest::decode(buf)?;
            self.handle(caller, &mut request, memory)?;
            Ok(request)
        })();
        match result {
            Ok(request) => {
                buf[..crate::wire::REQUEST_SIZE].copy_from_slice(&request.encode());
                0
            }
            Err(err) => err.return_code(),
        }
    }

    /// Handle one decoded request, writing output fields into `request`.
    ///
    /// # Errors
    ///
    /// See [`ControlError`]; the request is left unmodified on error.
    pub fn handle(
        &self,
        caller: &dyn CallerPrivilege,
        request: &mut ControlRequest,
        memory: &mut dyn UserMemory,
    ) -> Result<SubCommand, ControlError> {
        if !caller.is_admin() {
            return Err(ControlError::PermissionDenied);
        }
        let subcmd = SubCommand::try_from(request.subcmd)?;
        match subcmd {
            SubCommand::GetConfig => {
                request.set_config(&ConfigWire::from(self.hook.get_config()));
            }
            SubCommand::SetConfig => {
                self.hook
                    .set_config(request.config().to_config())
                    .map_err(|_| ControlError::InvalidArgument("configuration rejected"))?;
            }
            SubCommand::GetStats => {
                request.set_stats(&self.hook.get_stats());
            }
            SubCommand::GetSeeds => self.get_seeds(request, memory)?,
            SubCommand::ClearStats => self.hook.clear_stats(),
        }
        Ok(subcmd)
    }

    fn get_seeds(
        &self,
        request: &mut ControlRequest,
        memory: &mut dyn UserMemory,
    ) -> Result<(), ControlError> {
        let mut args = request.get_seeds();
        if args.count == 0 || args.count > MAX_SEEDS_PER_REQUEST {
            return Err(ControlError::InvalidArgument("count out of range"));
        }
        if args.dest_addr == 0 || args.dest_capacity_bytes == 0 {
            return Err(ControlError::InvalidArgument("missing destination buffer"));
        }
        let required = u64::from(args.count) * RECORD_WIRE_SIZE as u64;
        if u64::from(args.dest_capacity_bytes) < required {
            return Err(ControlError::InvalidArgument("destination buffer too small"));
        }
        if !self.hook.is_initialized() {
            return Err(ControlError::NoDevice);
        }

        let count = args.count as usize;
        let seeds = self.hook.copy_seeds(args.start_index as usize, count, count);
        let staging = stage_records(&seeds)?;
        if !seeds.is_empty() {
            memory.copy_out(args.dest_addr, &staging)?;
        }

        args.actual_count = seeds.len() as u32;
        request.set_get_seeds(&args);
        Ok(())
    }
}

/// Encode `seeds` back to back into a buffer sized for exactly those records.
fn stage_records(seeds: &[SeedRecord]) -> Result<Vec<u8>, ControlError> {
    let mut staging = Vec::new();
    staging
        .try_reserve_exact(seeds.len() * RECORD_WIRE_SIZE)
        .map_err(|_| ControlError::OutOfMemory)?;
    for seed in seeds {
        SeedRecordWire::encode_into(seed, &mut staging);
    }
    Ok(staging)
}
