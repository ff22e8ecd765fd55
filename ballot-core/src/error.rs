//! Error types for the ballot ledger

use thiserror::Error;

/// Result type for ballot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ballot ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Wrong arity, malformed dates, unknown field or function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing election, candidate, voter or audit entries
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate voter, duplicate candidate association, already voted
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Election end date has passed
    #[error("Expired: {0}")]
    Expired(String),

    /// Stored record is readable but its content cannot be used
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Value present under a key but fails to decode
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt {
        /// Ledger key holding the bad value
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    /// See [`Error::InvalidArgument`]
    InvalidArgument = 1,
    /// See [`Error::NotFound`]
    NotFound = 2,
    /// See [`Error::Conflict`]
    Conflict = 3,
    /// See [`Error::Expired`]
    Expired = 4,
    /// See [`Error::InvalidState`]
    InvalidState = 5,
    /// See [`Error::Corrupt`]
    Corrupt = 6,
    /// Storage, serialization, IO, actor and configuration failures
    Internal = 7,
}

impl ErrorKind {
    /// Numeric response code (0 is reserved for success)
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Expired => "expired",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Expired(_) => ErrorKind::Expired,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Corrupt { .. } => ErrorKind::Corrupt,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Build a corruption error for `key`
    pub fn corrupt(key: impl Into<String>, reason: impl ToString) -> Self {
        Error::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
