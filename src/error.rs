//! Error types for the pulsestream metrics core.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for pulsestream operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for pulsestream operations.
#[derive(Debug)]
pub enum Error {
    /// The backing store cannot be reached at connect or operation time
    StoreUnavailable(String),
    /// A record is missing required fields or carries an unknown metric type
    MalformedRecord(String),
    /// A retention window or purge threshold is out of range
    RetentionMisconfiguration(String),
    /// Storage backend errors
    Storage(String),
    /// Configuration errors
    Config(String),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serialization(String),
}

impl Error {
    /// Whether this error means the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// The bare message, without the variant's display prefix.
    pub fn into_message(self) -> String {
        match self {
            Error::StoreUnavailable(msg)
            | Error::MalformedRecord(msg)
            | Error::RetentionMisconfiguration(msg)
            | Error::Storage(msg)
            | Error::Config(msg)
            | Error::Serialization(msg) => msg,
            Error::Io(err) => err.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Error::MalformedRecord(msg) => write!(f, "Malformed record: {}", msg),
            Error::RetentionMisconfiguration(msg) => {
                write!(f, "Retention misconfiguration: {}", msg)
            }
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(format!("DuckDB error: {}", err))
    }
}
