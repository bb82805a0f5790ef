//! Harness error type.

use seedhook_control::{ControlError, DecodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("control request failed: {0}")]
    Control(#[from] ControlError),
    #[error("malformed seed record: {0}")]
    Decode(#[from] DecodeError),
    #[error("engine init failed: {0}")]
    Hook(#[from] seedhook_engine::HookError),
    #[error("worker thread panicked")]
    WorkerPanic,
}

impl HarnessError {
    /// Process exit code for the CLI.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Control(err) => err.errno(),
            Self::Io(_) | Self::Json(_) => 2,
            _ => 1,
        }
    }
}
