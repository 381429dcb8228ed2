//! Error types for the simulation engine
//!
//! All failures cross the engine boundary as `SimError` values; nothing in
//! the library panics except on broken internal invariants (duplicate batch
//! ids in the reorder buffer), which are bugs rather than runtime errors.

use std::io;

#[derive(Debug)]
pub enum SimError {
    /// Bad CLI flag or environment value.
    Config(String),
    /// Unusable input, e.g. an empty unit catalog.
    Input(String),
    /// Output or checkpoint write failure that survived a reopen attempt.
    Io(io::Error),
    /// Checkpoint magic or CRC mismatch. Recoverable: callers treat this as
    /// "no valid checkpoint" and start fresh.
    Checksum(String),
    /// A worker thread died; surfaced at the driver's join point after a
    /// final checkpoint has been written.
    Internal(String),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {}", msg),
            SimError::Input(msg) => write!(f, "input error: {}", msg),
            SimError::Io(err) => write!(f, "i/o error: {}", err),
            SimError::Checksum(msg) => write!(f, "checksum error: {}", msg),
            SimError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SimError {
    fn from(err: io::Error) -> Self {
        SimError::Io(err)
    }
}

impl SimError {
    /// Process exit code for the CLI front-ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Config(_) | SimError::Input(_) => 1,
            SimError::Io(_) | SimError::Internal(_) => 2,
            // A bad checkpoint is downgraded to a warning before it ever
            // reaches a binary; if one does surface, treat it as input.
            SimError::Checksum(_) => 1,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
