//! Privileged control surface for the seed-capture engine.
//!
//! Five subcommands travel in a fixed 104-byte request: `GET_CONFIG`,
//! `SET_CONFIG`, `GET_STATS`, `GET_SEEDS` and `CLEAR_STATS`. Every request is
//! gated on administrator privilege before anything else is inspected.
//!
//! # Architecture
//!
//! - **Wire layouts** (`wire`): little-endian request, config, stats and seed
//!   record layouts
//! - **Dispatch** (`dispatch`): permission gate, argument validation, engine calls
//! - **Caller memory** (`memory`): copy-out seam for `GET_SEEDS`
//! - **Privilege** (`privilege`): caller capability seam
//! - **Errors** (`error`): one errno per failure kind

#![deny(unsafe_code)]

pub mod dispatch;
pub mod error;
pub mod memory;
pub mod privilege;
pub mod wire;

pub use dispatch::ControlDispatcher;
pub use error::ControlError;
pub use memory::{UserMemory, VecUserMemory};
pub use privilege::{CallerPrivilege, ProcessPrivilege, StaticPrivilege};
pub use wire::{
    ConfigWire, ControlRequest, DecodeError, GetSeedsWire, MAX_SEEDS_PER_REQUEST,
    RECORD_WIRE_SIZE, REQUEST_SIZE, SeedRecordWire, StatsWire, SubCommand,
};
