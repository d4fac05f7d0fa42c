//! Error types for maestro.

use thiserror::Error;

/// Result type alias using maestro's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for playback orchestration operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested operation is not valid in the current state.
    ///
    /// Returned by the player state machine for intents that have no
    /// transition from the current state, and by the sync proxy when no
    /// timing authority is registered.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Malformed input to a contract call (bad tag, bad value type).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation attempted on a filter or pipeline in an incompatible
    /// lifecycle phase.
    #[error("wrong state: expected {expected}, got {actual}")]
    WrongState {
        /// The lifecycle phase the operation requires.
        expected: String,
        /// The lifecycle phase actually observed.
        actual: String,
    },

    /// A blocking hand-off or transition exceeded its time bound.
    #[error("operation timed out")]
    Timeout,

    /// A blocked operation was cancelled by a stop or reset.
    #[error("operation cancelled")]
    Cancelled,

    /// A state transition is already in flight; the intent was rejected
    /// rather than interleaved.
    #[error("transition pending: player is busy")]
    Busy,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lower-layer plugin failure, surfaced verbatim.
    #[error("plugin error: {0}")]
    Plugin(String),
}

impl Error {
    /// Shorthand for an [`Error::WrongState`] from displayable states.
    pub fn wrong_state(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Self::WrongState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Shorthand for an [`Error::InvalidOperation`] with a message.
    pub fn invalid_op(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}
