//! Seed-capture engine for a privileged driver's RPC control path.
//!
//! The engine sits at two interception points of the control path, records
//! observed call/response pairs ("seeds") into a bounded ring, optionally
//! mutates a copy of outgoing parameters for fuzzing, and exposes the recorded
//! data plus counters through a locked query interface.
//!
//! # Architecture
//!
//! The engine consists of:
//! - **Configuration** (`config`): flag set, capacity, mutation probability
//! - **Seed records** (`record`): bounded payloads, call-site identity, seed sources
//! - **Seed ring** (`ring`): fixed-capacity circular store with a write cursor
//! - **Dedup correlator** (`dedup`): 64-slot ring bridging Hook 1 and Hook 2
//! - **Counters** (`stats`): throughput/outcome snapshot for both hooks
//! - **Time and entropy** (`clock`, `entropy`): injectable sources
//! - **Engine** (`engine`): lifecycle, single lock, extraction, mutation
//! - **Interception points** (`hooks`): Hook 1 prologue/response, Hook 2 dispatch/response
//! - **Interceptor** (`interceptor`): composes the hooks around an RPC transport

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod hooks;
pub mod interceptor;
pub mod record;
pub mod ring;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HookConfig, HookFlags};
pub use engine::SeedHook;
pub use entropy::{ClockEntropy, EntropySource, XorShiftEntropy};
pub use error::HookError;
pub use hooks::Hook2Class;
pub use interceptor::{ControlInterceptor, InterceptOutcome, RpcTransport, SimulatedTransport};
pub use record::{BoundedPayload, CallSite, MAX_PARAMS_SIZE, SeedCapture, SeedRecord, SeedSource};
pub use stats::HookStats;
