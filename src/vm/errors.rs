//! VM errors

use std::time::Duration;
use thiserror::Error;

use crate::runtime::memory::AllocError;

/// VM result
pub type VMResult<T> = Result<T, VMError>;

/// VM errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    #[error("Invalid magic: image is not an RXE program")]
    InvalidMagic,

    #[error("Unsupported version: {found:#06x} (expected {expected:#06x})")]
    UnsupportedVersion {
        /// Version field found in the image
        found: u16,
        /// The only version this loader accepts
        expected: u16,
    },

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes the failed allocation asked for
        requested: usize,
        /// Bytes left in the pool at the time of the request
        available: usize,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Decode error at pc {pc:#06x}: {reason}")]
    Decode {
        /// Image offset of the instruction that failed to decode
        pc: usize,
        /// Decoder-supplied description
        reason: String,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    // === Run limits ===
    // Only raised between passes, the context stays resumable.
    #[error("Pass limit exceeded after {0} passes")]
    PassLimitExceeded(u64),

    #[error("Execution timeout after {0:?}")]
    Timeout(Duration),
}

impl VMError {
    /// Shorthand for a [`VMError::CorruptImage`] with a formatted reason
    pub fn corrupt(reason: impl Into<String>) -> Self {
        VMError::CorruptImage(reason.into())
    }

    /// Whether the error was raised by a run limit rather than by the program
    pub fn is_run_limit(&self) -> bool {
        matches!(self, VMError::PassLimitExceeded(_) | VMError::Timeout(_))
    }
}

impl From<AllocError> for VMError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::OutOfMemory {
                requested,
                available,
            } => VMError::OutOfMemory {
                requested,
                available,
            },
        }
    }
}
