//! Operator tooling for the seed-capture engine.
//!
//! This crate provides:
//! - Workload driver: synthetic multi-threaded control traffic through the hooks
//! - Control client: logged control requests against an in-process dispatcher
//! - Monitor: periodic stats polls that collect only seeds not seen before
//! - Seed export: `.bin` wire records, `summary.csv`, SHA-256 artifact index
//! - Structured logging: JSONL log entries, emitter, and validator

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod export;
pub mod monitor;
pub mod structured_log;
pub mod workload;

pub use client::ControlClient;
pub use error::HarnessError;
pub use export::{ExportSummary, export_seeds};
pub use monitor::{Monitor, MonitorPoll};
pub use workload::{WorkloadConfig, WorkloadReport, run_workload};
