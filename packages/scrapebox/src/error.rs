//! Typed errors for the scrapebox library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Each concern gets its own
//! enum; callers that don't care can bubble everything through `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the platform status API.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The status call itself failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success code
    #[error("platform rejected status report ({code}): {message}")]
    Platform { code: u16, message: String },
}

/// Errors from alert email composition or delivery.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Sender or recipient address failed to parse
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be assembled
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP relay rejected or dropped the message
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Errors from the job guard's reporting machinery.
///
/// Job failures themselves never surface here; they come back as a
/// [`JobOutcome::Failed`](crate::guard::JobOutcome). These are failures of
/// the guard's own side effects.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Status report failed
    #[error("status report failed: {0}")]
    Status(#[from] StatusError),

    /// Alert email failed
    #[error("alert email failed: {0}")]
    Alert(#[from] AlertError),

    /// Failure log could not be written or read
    #[error("log file {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a record sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Destination table does not exist yet; the loader creates it lazily
    #[error("table does not exist: {table}")]
    MissingTable { table: String },

    /// Any other database error; aborts the load for the table
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the batch loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Payload carries neither inline records nor a record file
    #[error("payload {index} carries neither records nor a file")]
    EmptyPayload { index: usize },

    /// Payload names no destination table in a mode that needs one
    #[error("payload {index} names no destination table")]
    UnnamedPayload { index: usize },

    /// No table descriptor matches the payload's table name
    #[error("no table descriptor matches `{table}`")]
    UnknownTable { table: String },

    /// Record file could not be read
    #[error("record file {path}: {source}")]
    RecordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record file line is not a JSON object
    #[error("malformed record in {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Sink operation failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Result type alias for guard operations.
pub type GuardResult<T> = std::result::Result<T, GuardError>;

/// Result type alias for loader operations.
pub type LoadResult<T> = std::result::Result<T, LoaderError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;
