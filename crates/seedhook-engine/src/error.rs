//! Engine error taxonomy.

use thiserror::Error;

/// Failures surfaced by engine operations that require a running engine.
///
/// Read-only queries never fail: they return zeroed or empty results when the
/// engine is not initialized.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    /// Operation requires `init()` to have completed.
    #[error("seed hook is not initialized")]
    InvalidState,
    /// Backing storage could not be allocated, or no ring is installed.
    #[error("insufficient resources for {requested} bytes of seed storage")]
    ResourceExhausted { requested: usize },
}
