//! Unified error handling for the round-pace library.
//!
//! Pure computations (factor calculation, live blending) never fail: missing
//! evidence degrades to neutral factors and an "unreliable" projection instead.
//! Errors only come from the edges: the round source, configuration and
//! malformed round descriptors.

use thiserror::Error;

/// Unified error type for round-pace operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaceError {
    /// The historical round source failed (database, I/O, decoding)
    #[error("Round source error: {message}")]
    Source { message: String },

    /// The round descriptor handed to the engine cannot be used
    #[error("Round '{round_id}' is invalid: {message}")]
    InvalidRound { round_id: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PaceError {
    pub fn from_source(message: impl Into<String>) -> Self {
        PaceError::Source {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        PaceError::Config {
            message: message.into(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for PaceError {
    fn from(err: rusqlite::Error) -> Self {
        PaceError::from_source(err.to_string())
    }
}

/// Result type alias for round-pace operations.
pub type Result<T> = std::result::Result<T, PaceError>;

/// Extension trait for converting Option to PaceError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid round error.
    fn ok_or_invalid_round(self, round_id: &str, message: &str) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_round(self, round_id: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| PaceError::InvalidRound {
            round_id: round_id.to_string(),
            message: message.to_string(),
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| PaceError::Internal {
            message: message.to_string(),
        })
    }
}
