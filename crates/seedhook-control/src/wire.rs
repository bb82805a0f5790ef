//! Little-endian wire layouts for control requests and seed records.
//!
//! Layouts follow natural C alignment so a native client can overlay them
//! with plain structs:
//!
//! ```text
//! ControlRequest (104 B)   subcmd u32 | pad u32 | payload [96]
//! ConfigWire     (32 B)    flags u32 | capacity u32 | probability u32 | pad u32
//!                          | buffer_addr u64 | buffer_size u32 | pad u32
//! StatsWire      (96 B)    12 x u64 counters
//! GetSeedsWire   (24 B)    start u32 | count u32 | dest_addr u64
//!                          | dest_capacity_bytes u32 | actual_count u32
//! ```

use seedhook_engine::{
    BoundedPayload, HookConfig, HookFlags, HookStats, MAX_PARAMS_SIZE, SeedRecord, SeedSource,
};
use thiserror::Error;

use crate::error::ControlError;

pub const REQUEST_SIZE: usize = 104;
pub const PAYLOAD_SIZE: usize = 96;
pub const CONFIG_WIRE_SIZE: usize = 32;
pub const STATS_WIRE_SIZE: usize = 96;
pub const GET_SEEDS_WIRE_SIZE: usize = 24;

/// Upper bound on `count` in one `GET_SEEDS` request.
pub const MAX_SEEDS_PER_REQUEST: u32 = 1000;

/// Failure decoding a wire buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    Short { need: usize, got: usize },
    #[error("{field} length {len} exceeds {max}")]
    Length {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl From<DecodeError> for ControlError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Short { .. } => Self::InvalidArgument("request buffer too short"),
            DecodeError::Length { .. } => Self::InvalidArgument("payload length out of range"),
        }
    }
}

fn need(buf: &[u8], len: usize) -> Result<(), DecodeError> {
    if buf.len() < len {
        return Err(DecodeError::Short {
            need: len,
            got: buf.len(),
        });
    }
    Ok(())
}

#[inline]
fn write_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn write_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0_u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

/// Control subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SubCommand {
    GetConfig = 1,
    SetConfig = 2,
    GetStats = 3,
    GetSeeds = 4,
    ClearStats = 5,
}

impl SubCommand {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetConfig => "GET_CONFIG",
            Self::SetConfig => "SET_CONFIG",
            Self::GetStats => "GET_STATS",
            Self::GetSeeds => "GET_SEEDS",
            Self::ClearStats => "CLEAR_STATS",
        }
    }
}

impl TryFrom<u32> for SubCommand {
    type Error = ControlError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::GetConfig),
            2 => Ok(Self::SetConfig),
            3 => Ok(Self::GetStats),
            4 => Ok(Self::GetSeeds),
            5 => Ok(Self::ClearStats),
            _ => Err(ControlError::InvalidArgument("unknown subcommand")),
        }
    }
}

/// `GET_CONFIG` / `SET_CONFIG` payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConfigWire {
    pub flags: u32,
    pub capacity: u32,
    pub probability: u32,
    /// Never populated by the engine; ignored on `SET_CONFIG`.
    pub buffer_addr: u64,
    pub buffer_size: u32,
}

impl ConfigWire {
    const OFF_FLAGS: usize = 0;
    const OFF_CAPACITY: usize = 4;
    const OFF_PROBABILITY: usize = 8;
    const OFF_BUFFER_ADDR: usize = 16;
    const OFF_BUFFER_SIZE: usize = 24;

    #[must_use]
    pub fn encode(&self) -> [u8; CONFIG_WIRE_SIZE] {
        let mut b = [0_u8; CONFIG_WIRE_SIZE];
        write_u32(&mut b, Self::OFF_FLAGS, self.flags);
        write_u32(&mut b, Self::OFF_CAPACITY, self.capacity);
        write_u32(&mut b, Self::OFF_PROBABILITY, self.probability);
        write_u64(&mut b, Self::OFF_BUFFER_ADDR, self.buffer_addr);
        write_u32(&mut b, Self::OFF_BUFFER_SIZE, self.buffer_size);
        b
    }

    /// # Errors
    ///
    /// [`DecodeError::Short`] if `buf` is shorter than the layout.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        need(buf, CONFIG_WIRE_SIZE)?;
        Ok(Self {
            flags: read_u32(buf, Self::OFF_FLAGS),
            capacity: read_u32(buf, Self::OFF_CAPACITY),
            probability: read_u32(buf, Self::OFF_PROBABILITY),
            buffer_addr: read_u64(buf, Self::OFF_BUFFER_ADDR),
            buffer_size: read_u32(buf, Self::OFF_BUFFER_SIZE),
        })
    }

    /// Engine view; buffer location is dropped and unknown flag bits are
    /// ignored.
    #[must_use]
    pub fn to_config(&self) -> HookConfig {
        HookConfig {
            flags: HookFlags::from_bits_truncate(self.flags),
            capacity: self.capacity,
            mutation_probability: self.probability,
        }
    }
}

impl From<HookConfig> for ConfigWire {
    fn from(cfg: HookConfig) -> Self {
        Self {
            flags: cfg.flags.bits(),
            capacity: cfg.capacity,
            probability: cfg.mutation_probability,
            buffer_addr: 0,
            buffer_size: 0,
        }
    }
}

/// `GET_STATS` payload, counters in declaration order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsWire(pub HookStats);

impl StatsWire {
    fn fields(s: &HookStats) -> [u64; 12] {
        [
            s.total_hooks,
            s.rpc_hooks,
            s.local_hooks,
            s.seed_records,
            s.inline_fuzz_count,
            s.errors,
            s.hook2_total_hooks,
            s.hook2_duplicates,
            s.hook2_bypass_hooks,
            s.hook2_internal_hooks,
            s.hook2_serialized_hooks,
            s.hook2_seed_records,
        ]
    }

    #[must_use]
    pub fn encode(&self) -> [u8; STATS_WIRE_SIZE] {
        let mut b = [0_u8; STATS_WIRE_SIZE];
        for (i, v) in Self::fields(&self.0).into_iter().enumerate() {
            write_u64(&mut b, i * 8, v);
        }
        b
    }

    /// # Errors
    ///
    /// [`DecodeError::Short`] if `buf` is shorter than the layout.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        need(buf, STATS_WIRE_SIZE)?;
        let f = |i: usize| read_u64(buf, i * 8);
        Ok(Self(HookStats {
            total_hooks: f(0),
            rpc_hooks: f(1),
            local_hooks: f(2),
            seed_records: f(3),
            inline_fuzz_count: f(4),
            errors: f(5),
            hook2_total_hooks: f(6),
            hook2_duplicates: f(7),
            hook2_bypass_hooks: f(8),
            hook2_internal_hooks: f(9),
            hook2_serialized_hooks: f(10),
            hook2_seed_records: f(11),
        }))
    }
}

/// `GET_SEEDS` payload. `actual_count` is filled in by the dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GetSeedsWire {
    pub start_index: u32,
    pub count: u32,
    pub dest_addr: u64,
    pub dest_capacity_bytes: u32,
    pub actual_count: u32,
}

impl GetSeedsWire {
    const OFF_START: usize = 0;
    const OFF_COUNT: usize = 4;
    const OFF_DEST_ADDR: usize = 8;
    const OFF_DEST_CAPACITY: usize = 16;
    const OFF_ACTUAL: usize = 20;

    #[must_use]
    pub fn encode(&self) -> [u8; GET_SEEDS_WIRE_SIZE] {
        let mut b = [0_u8; GET_SEEDS_WIRE_SIZE];
        write_u32(&mut b, Self::OFF_START, self.start_index);
        write_u32(&mut b, Self::OFF_COUNT, self.count);
        write_u64(&mut b, Self::OFF_DEST_ADDR, self.dest_addr);
        write_u32(&mut b, Self::OFF_DEST_CAPACITY, self.dest_capacity_bytes);
        write_u32(&mut b, Self::OFF_ACTUAL, self.actual_count);
        b
    }

    /// # Errors
    ///
    /// [`DecodeError::Short`] if `buf` is shorter than the layout.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        need(buf, GET_SEEDS_WIRE_SIZE)?;
        Ok(Self {
            start_index: read_u32(buf, Self::OFF_START),
            count: read_u32(buf, Self::OFF_COUNT),
            dest_addr: read_u64(buf, Self::OFF_DEST_ADDR),
            dest_capacity_bytes: read_u32(buf, Self::OFF_DEST_CAPACITY),
            actual_count: read_u32(buf, Self::OFF_ACTUAL),
        })
    }
}

/// One control request: subcommand plus a union payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub subcmd: u32,
    payload: [u8; PAYLOAD_SIZE],
}

impl ControlRequest {
    const OFF_SUBCMD: usize = 0;
    const OFF_PAYLOAD: usize = 8;

    /// Request with a zeroed payload.
    #[must_use]
    pub const fn new(subcmd: u32) -> Self {
        Self {
            subcmd,
            payload: [0; PAYLOAD_SIZE],
        }
    }

    #[must_use]
    pub fn with_config(subcmd: SubCommand, cfg: &ConfigWire) -> Self {
        let mut req = Self::new(subcmd as u32);
        req.set_config(cfg);
        req
    }

    #[must_use]
    pub fn with_get_seeds(args: &GetSeedsWire) -> Self {
        let mut req = Self::new(SubCommand::GetSeeds as u32);
        req.set_get_seeds(args);
        req
    }

    #[must_use]
    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.payload
    }

    #[must_use]
    pub fn config(&self) -> ConfigWire {
        ConfigWire::decode(&self.payload).unwrap_or_default()
    }

    pub fn set_config(&mut self, cfg: &ConfigWire) {
        self.payload[..CONFIG_WIRE_SIZE].copy_from_slice(&cfg.encode());
    }

    #[must_use]
    pub fn stats(&self) -> HookStats {
        StatsWire::decode(&self.payload).map(|s| s.0).unwrap_or_default()
    }

    pub fn set_stats(&mut self, stats: &HookStats) {
        self.payload[..STATS_WIRE_SIZE].copy_from_slice(&StatsWire(*stats).encode());
    }

    #[must_use]
    pub fn get_seeds(&self) -> GetSeedsWire {
        GetSeedsWire::decode(&self.payload).unwrap_or_default()
    }

    pub fn set_get_seeds(&mut self, args: &GetSeedsWire) {
        self.payload[..GET_SEEDS_WIRE_SIZE].copy_from_slice(&args.encode());
    }

    #[must_use]
    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut b = [0_u8; REQUEST_SIZE];
        write_u32(&mut b, Self::OFF_SUBCMD, self.subcmd);
        b[Self::OFF_PAYLOAD..].copy_from_slice(&self.payload);
        b
    }

    /// # Errors
    ///
    /// [`DecodeError::Short`] if `buf` is shorter than [`REQUEST_SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        need(buf, REQUEST_SIZE)?;
        let mut payload = [0_u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&buf[Self::OFF_PAYLOAD..REQUEST_SIZE]);
        Ok(Self {
            subcmd: read_u32(buf, Self::OFF_SUBCMD),
            payload,
        })
    }
}

/// Fixed-size seed record as copied out by `GET_SEEDS` and saved by tooling.
///
/// ```text
/// off      size   field
/// 0        4      client
/// 4        4      object
/// 8        4      command
/// 12       4      params_len
/// 16       4      ctrl_flags
/// 20       4      access_right
/// 24       65536  params
/// 65560    8      timestamp_ns
/// 65568    4      gpu_instance
/// 65572    4      offloaded (0/1)
/// 65576    4      response_status
/// 65580    4      response_len
/// 65584    65536  response
/// 131120   8      latency_us
/// 131128   4      sequence (low 32 bits)
/// 131132   1      source
/// 131133   1      serialized
/// 131134   2      reserved
/// ```
pub struct SeedRecordWire;

pub const RECORD_WIRE_SIZE: usize = 131_136;

const OFF_CLIENT: usize = 0;
const OFF_OBJECT: usize = 4;
const OFF_COMMAND: usize = 8;
const OFF_PARAMS_LEN: usize = 12;
const OFF_CTRL_FLAGS: usize = 16;
const OFF_ACCESS_RIGHT: usize = 20;
const OFF_PARAMS: usize = 24;
const OFF_TIMESTAMP: usize = OFF_PARAMS + MAX_PARAMS_SIZE;
const OFF_GPU_INSTANCE: usize = OFF_TIMESTAMP + 8;
const OFF_OFFLOADED: usize = OFF_GPU_INSTANCE + 4;
const OFF_STATUS: usize = OFF_OFFLOADED + 4;
const OFF_RESPONSE_LEN: usize = OFF_STATUS + 4;
const OFF_RESPONSE: usize = OFF_RESPONSE_LEN + 4;
const OFF_LATENCY: usize = OFF_RESPONSE + MAX_PARAMS_SIZE;
const OFF_SEQUENCE: usize = OFF_LATENCY + 8;
const OFF_SOURCE: usize = OFF_SEQUENCE + 4;
const OFF_SERIALIZED: usize = OFF_SOURCE + 1;
const OFF_RESERVED: usize = OFF_SERIALIZED + 1;

const _: () = assert!(OFF_RESERVED + 2 == RECORD_WIRE_SIZE);

impl SeedRecordWire {
    /// Append the encoded record to `out`.
    pub fn encode_into(record: &SeedRecord, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + RECORD_WIRE_SIZE, 0);
        let b = &mut out[start..];

        let params = record.params.as_slice();
        let response = record.response.as_slice();
        write_u32(b, OFF_CLIENT, record.client);
        write_u32(b, OFF_OBJECT, record.object);
        write_u32(b, OFF_COMMAND, record.command);
        write_u32(b, OFF_PARAMS_LEN, params.len() as u32);
        write_u32(b, OFF_CTRL_FLAGS, record.ctrl_flags);
        write_u32(b, OFF_ACCESS_RIGHT, record.access_right);
        b[OFF_PARAMS..OFF_PARAMS + params.len()].copy_from_slice(params);
        write_u64(b, OFF_TIMESTAMP, record.timestamp_ns);
        write_u32(b, OFF_GPU_INSTANCE, record.gpu_instance);
        write_u32(b, OFF_OFFLOADED, u32::from(record.offloaded));
        write_u32(b, OFF_STATUS, record.response_status);
        write_u32(b, OFF_RESPONSE_LEN, response.len() as u32);
        b[OFF_RESPONSE..OFF_RESPONSE + response.len()].copy_from_slice(response);
        write_u64(b, OFF_LATENCY, record.latency_us);
        write_u32(b, OFF_SEQUENCE, record.sequence as u32);
        b[OFF_SOURCE] = record.source.bits();
        b[OFF_SERIALIZED] = u8::from(record.serialized);
    }

    #[must_use]
    pub fn encode(record: &SeedRecord) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_WIRE_SIZE);
        Self::encode_into(record, &mut out);
        out
    }

    /// Decode one record from the front of `buf`.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Short`] if `buf` holds less than one record.
    /// - [`DecodeError::Length`] if a payload length exceeds the fixed area.
    pub fn decode(buf: &[u8]) -> Result<SeedRecord, DecodeError> {
        need(buf, RECORD_WIRE_SIZE)?;
        let params_len = read_u32(buf, OFF_PARAMS_LEN) as usize;
        if params_len > MAX_PARAMS_SIZE {
            return Err(DecodeError::Length {
                field: "params",
                len: params_len,
                max: MAX_PARAMS_SIZE,
            });
        }
        let response_len = read_u32(buf, OFF_RESPONSE_LEN) as usize;
        if response_len > MAX_PARAMS_SIZE {
            return Err(DecodeError::Length {
                field: "response",
                len: response_len,
                max: MAX_PARAMS_SIZE,
            });
        }

        Ok(SeedRecord {
            client: read_u32(buf, OFF_CLIENT),
            object: read_u32(buf, OFF_OBJECT),
            command: read_u32(buf, OFF_COMMAND),
            params: BoundedPayload::from_parts(
                buf[OFF_PARAMS..OFF_PARAMS + params_len].to_vec(),
                false,
            ),
            ctrl_flags: read_u32(buf, OFF_CTRL_FLAGS),
            access_right: read_u32(buf, OFF_ACCESS_RIGHT),
            timestamp_ns: read_u64(buf, OFF_TIMESTAMP),
            gpu_instance: read_u32(buf, OFF_GPU_INSTANCE),
            offloaded: read_u32(buf, OFF_OFFLOADED) != 0,
            response_status: read_u32(buf, OFF_STATUS),
            response: BoundedPayload::from_parts(
                buf[OFF_RESPONSE..OFF_RESPONSE + response_len].to_vec(),
                false,
            ),
            latency_us: read_u64(buf, OFF_LATENCY),
            sequence: u64::from(read_u32(buf, OFF_SEQUENCE)),
            source: SeedSource::from_bits_retain(buf[OFF_SOURCE]),
            serialized: buf[OFF_SERIALIZED] != 0,
        })
    }
}
