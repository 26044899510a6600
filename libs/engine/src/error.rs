//! Error taxonomy for the reconciliation engine.
//!
//! Callers branch on the error kind, never on message strings:
//!
//! - [`PoolError::InvalidArgument`] and [`PoolError::NotFound`] surface
//!   synchronously and are never retried.
//! - [`PoolError::Driver`] is recoverable: a scheduled pass logs, alerts
//!   and moves on; the next pass retries naturally.
//! - [`PoolError::PartialStart`] reports a short-started scale-out while
//!   still handing back the machines that did come up.

use skypool_model::{Machine, MachineId};
use thiserror::Error;

/// Result type for engine operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors produced by the engine and by cloud drivers.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A caller-supplied value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation targeted a machine the backend does not know.
    #[error("machine not found: {0}")]
    NotFound(MachineId),

    /// A backend or network failure in the driver.
    #[error("driver error: {0}")]
    Driver(String),

    /// Fewer machines started than requested; `started` holds the subset
    /// that did come up and is accepted into the pool's bookkeeping.
    #[error("started {}/{requested} machines: {reason}", .started.len())]
    PartialStart {
        requested: u32,
        started: Vec<Machine>,
        reason: String,
    },

    /// The pool manager has not been configured yet.
    #[error("pool manager is not configured")]
    NotConfigured,

    /// The pool manager has been closed.
    #[error("pool manager is stopped")]
    Stopped,
}

impl PoolError {
    /// Shorthand for an [`PoolError::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True for failures a later reconciliation pass retries naturally.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::PartialStart { .. })
    }
}
