//! Boundary error taxonomy and errno mapping.

use seedhook_engine::HookError;
use thiserror::Error;

/// Failures reported across the control boundary.
///
/// Each variant maps to exactly one errno; `return_code` is the negated value
/// handed back to the caller of the control entry point.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("caller lacks administrator privilege")]
    PermissionDenied,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("seed hook is not initialized")]
    NoDevice,
    #[error("out of memory staging seed records")]
    OutOfMemory,
    #[error("cannot copy to caller buffer at {addr:#x}")]
    Fault { addr: u64 },
}

impl ControlError {
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::PermissionDenied => libc::EPERM,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::NoDevice => libc::ENODEV,
            Self::OutOfMemory => libc::ENOMEM,
            Self::Fault { .. } => libc::EFAULT,
        }
    }

    #[must_use]
    pub const fn return_code(&self) -> i32 {
        -self.errno()
    }

    /// Stable lowercase name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NoDevice => "no_device",
            Self::OutOfMemory => "out_of_memory",
            Self::Fault { .. } => "fault",
        }
    }
}

impl From<HookError> for ControlError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::InvalidState => Self::NoDevice,
            HookError::ResourceExhausted { .. } => Self::OutOfMemory,
        }
    }
}
