//! Error types for FastPileup
//!
//! Defines all error types used throughout the library. Cancellation and
//! low memory are not errors: loads report them through
//! [`LoadStatus`](crate::core::LoadStatus).

use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Main error type for FastPileup operations
#[derive(Debug, Error)]
pub enum FastPileupError {
    /// The alignment source failed while a load was scanning it
    #[error("Error loading alignment data: {message}")]
    DataLoad { message: String },

    /// Locus string could not be parsed
    #[error("Locus error: {0}")]
    Locus(#[from] LocusError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SourceError> for FastPileupError {
    fn from(e: SourceError) -> Self {
        FastPileupError::DataLoad { message: e.to_string() }
    }
}

/// Failures raised by an alignment source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Malformed record in the underlying data
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    /// Chromosome absent from the source header
    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    /// Error from htslib
    #[error("HTSlib error: {0}")]
    Htslib(String),

    /// I/O error while scanning
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors parsing a `chr:start-end` locus
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocusError {
    #[error("Empty locus")]
    Empty,

    #[error("Invalid coordinate '{0}'")]
    InvalidCoordinate(String),

    #[error("Invalid coordinate range: start ({start}) > end ({end})")]
    InvalidRange { start: u64, end: u64 },
}

/// Invalid configuration values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Result type alias for FastPileup operations
pub type Result<T> = std::result::Result<T, FastPileupError>;

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Default window for suppressing a repeated error message
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Surfaces each distinct message at most once per window
#[derive(Debug)]
pub struct ErrorDebouncer {
    window: Duration,
    last_shown: HashMap<String, Instant>,
}

impl Default for ErrorDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl ErrorDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: HashMap::new(),
        }
    }

    /// True when `message` should be shown to the user at `now`
    pub fn should_report(&mut self, message: &str, now: Instant) -> bool {
        if let Some(last) = self.last_shown.get(message) {
            if now.duration_since(*last) < self.window {
                log::debug!("Suppressing repeated error: {}", message);
                return false;
            }
        }
        self.last_shown.insert(message.to_string(), now);
        true
    }
}
