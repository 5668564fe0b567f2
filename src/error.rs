//! Unified error handling for the proximity scanner.
//!
//! Every fallible operation in the crate returns [`Result`], so callers only
//! ever have to match on one error type.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Unified error type for proximity scanning.
#[derive(Debug, Error)]
pub enum ProximityError {
    /// Configuration values that cannot drive a scan
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The observation source failed outside of a window fetch
    #[error("Observation source error: {message}")]
    Source { message: String },

    /// A window fetch kept failing after all retries
    #[error(
        "Fetching window {window_index} [{start}, {end}) failed after {attempts} attempts: {message}"
    )]
    WindowFetchFailed {
        window_index: usize,
        start: NaiveDateTime,
        end: NaiveDateTime,
        attempts: u32,
        message: String,
    },

    /// A timestamp could not be represented
    #[error("Invalid timestamp: {message}")]
    InvalidTimestamp { message: String },

    /// SQLite error from the bundled store
    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Report could not be serialized
    #[error("Report error: {message}")]
    Report { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for ProximityError {
    fn from(err: csv::Error) -> Self {
        ProximityError::Report {
            message: err.to_string(),
        }
    }
}

/// Result type alias for proximity operations.
pub type Result<T> = std::result::Result<T, ProximityError>;

/// Extension trait for converting Option to ProximityError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid timestamp error.
    fn ok_or_invalid_timestamp(self, message: &str) -> Result<T>;

    /// Convert Option to Result with a source error.
    fn ok_or_source(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_timestamp(self, message: &str) -> Result<T> {
        self.ok_or_else(|| ProximityError::InvalidTimestamp {
            message: message.to_string(),
        })
    }

    fn ok_or_source(self, message: &str) -> Result<T> {
        self.ok_or_else(|| ProximityError::Source {
            message: message.to_string(),
        })
    }
}
