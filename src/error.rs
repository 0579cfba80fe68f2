//! Error types for tdbulk.
//!
//! Errors are organized by functional area. Configuration and protocol errors
//! abort the session; data errors are row-scoped and accumulate into the load
//! summary; a non-success completion code surfaces as [`TransferError::JobFailed`].

use crate::session::{CompletionCode, SessionState};
use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Caller supplied invalid configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The remote engine rejected or could not be reached during negotiation
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Framing or protocol desynchronization
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Row-scoped data errors
    #[error(transparent)]
    Data(#[from] DataError),

    /// Statement or target table could not produce a schema
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Transport layer errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Decoded rows could not be converted to Arrow
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The job finished with a non-success completion code
    #[error("Job failed with completion code {code}")]
    JobFailed { code: CompletionCode },
}

/// Errors caused by invalid caller configuration. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Unknown or unparseable attribute
    #[error("Invalid attribute '{key}': {message}")]
    InvalidAttribute { key: String, message: String },

    /// Attribute set violates an invariant (e.g. min_sessions > max_sessions)
    #[error("Invalid attributes: {0}")]
    InvalidAttributes(String),

    /// Connection string parsing error
    #[error("Failed to parse connection string: {0}")]
    ParseError(String),

    /// Encoding mask touches unknown bits or combines values within a partition
    #[error("Invalid encoding mask 0x{mask:06x}")]
    InvalidEncoding { mask: u32 },

    /// Null sentinel or delimiter is incompatible with the codec
    #[error("Encoding configuration error: {0}")]
    EncodingConfig(String),

    /// Operation not permitted in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: SessionState,
    },
}

/// Errors raised while negotiating attributes or initiating the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The engine refused one attribute value
    #[error("Attribute '{key}' rejected by server (code {remote_code})")]
    AttributeRejected { key: String, remote_code: i32 },

    /// The engine could not be reached
    #[error("Failed to reach {host}:{port}: {message}")]
    Unreachable {
        host: String,
        port: u16,
        message: String,
    },

    /// The engine refused to start the job
    #[error("Initiation rejected by server (code {remote_code}): {message}")]
    InitiationError { remote_code: i32, message: String },

    /// The job stayed queued for the whole tenacity window
    #[error("Job still queued after {hours}h of tenacity")]
    TenacityExhausted { hours: u32 },
}

/// Protocol-level errors. Always fatal for the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer framing does not match its contents
    #[error("Corrupt buffer at byte {offset}: {message}")]
    CorruptBuffer { offset: usize, message: String },

    /// Server sent something the session did not expect
    #[error("Protocol desynchronized: {0}")]
    Desync(String),

    /// Server stopped answering within the tenacity window
    #[error("No reply to {operation} within {hours}h")]
    Stalled { operation: &'static str, hours: u32 },

    /// Server allocated a session pool outside the negotiated bounds
    #[error("Server allocated {allocated} sessions, outside [{min}, {max}]")]
    SessionPoolOutOfBounds { allocated: u32, min: u32, max: u32 },
}

/// Row-scoped data errors. The session continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Field cannot be coerced to the column's remote type
    #[error("Type mismatch for column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    /// Variable-length field exceeds the column's byte length
    #[error("Value too large for column '{column}' (limit {limit} bytes)")]
    ValueTooLarge { column: String, limit: usize },

    /// Row refused either locally or by the server
    #[error("Row {row_index} rejected: {reason}")]
    RowRejected { row_index: usize, reason: String },
}

/// Errors fetching the schema for a statement or target table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Statement rejected by the server
    #[error("Invalid statement (code {remote_code}): {message}")]
    InvalidStatement { remote_code: i32, message: String },

    /// Target table rejected by the server
    #[error("Invalid target table '{table}' (code {remote_code}): {message}")]
    InvalidTarget {
        table: String,
        remote_code: i32,
        message: String,
    },

    /// Statement text is empty after normalization
    #[error("Statement is empty")]
    EmptyStatement,

    /// Server described a column with a type code this client does not know
    #[error("Unsupported type code {type_code} for column '{column}'")]
    UnsupportedType { column: String, type_code: u16 },

    /// No query or target has been set
    #[error("Must set target table or query")]
    NotSet,
}

/// Errors related to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Message serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid response from server
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Message send error
    #[error("Failed to send message: {0}")]
    SendError(String),

    /// Message receive error
    #[error("Failed to receive message: {0}")]
    ReceiveError(String),

    /// Operation requires a connected transport
    #[error("Not connected")]
    NotConnected,
}

/// Errors converting decoded rows to Arrow arrays.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Value does not fit the Arrow type of its column
    #[error("Failed to convert value at row {row}, column {column}: {message}")]
    ValueConversionFailed {
        row: usize,
        column: usize,
        message: String,
    },

    /// Arrow rejected the assembled batch
    #[error("Arrow error: {0}")]
    ArrowError(String),
}

/// Error raised by the statement-execution collaborator for one SQL statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Statement failed with code {code}: {message}")]
pub struct StatementError {
    pub code: i32,
    pub message: String,
}

/// Errors printing a load job's error tables.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Failed to write error table: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors writing or reading an export archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The input does not start with the archive magic bytes
    #[error("Not a tdbulk archive")]
    BadMagic,

    #[error("Unsupported archive version {0}")]
    UnsupportedVersion(u16),

    /// Schema header could not be written or parsed
    #[error("Invalid archive header: {0}")]
    Header(String),

    /// Row framing is broken
    #[error("Corrupt archive at byte {offset}: {message}")]
    Corrupt { offset: u64, message: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`TransferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Negotiation,
    Protocol,
    Data,
    Schema,
    Transport,
    Conversion,
    JobFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "CONFIGURATION"),
            ErrorKind::Negotiation => write!(f, "NEGOTIATION"),
            ErrorKind::Protocol => write!(f, "PROTOCOL"),
            ErrorKind::Data => write!(f, "DATA"),
            ErrorKind::Schema => write!(f, "SCHEMA"),
            ErrorKind::Transport => write!(f, "TRANSPORT"),
            ErrorKind::Conversion => write!(f, "CONVERSION"),
            ErrorKind::JobFailed => write!(f, "JOB_FAILED"),
        }
    }
}

impl TransferError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Configuration(_) => ErrorKind::Configuration,
            TransferError::Negotiation(_) => ErrorKind::Negotiation,
            TransferError::Protocol(_) => ErrorKind::Protocol,
            TransferError::Data(_) => ErrorKind::Data,
            TransferError::Schema(_) => ErrorKind::Schema,
            TransferError::Transport(_) => ErrorKind::Transport,
            TransferError::Conversion(_) => ErrorKind::Conversion,
            TransferError::JobFailed { .. } => ErrorKind::JobFailed,
        }
    }

    /// Whether the session moves to `Failed` when this error is raised.
    ///
    /// Configuration, schema and data errors leave the session usable, as do
    /// a rejected attribute and an unreachable engine.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransferError::Configuration(_)
            | TransferError::Schema(_)
            | TransferError::Data(_)
            | TransferError::Conversion(_) => false,
            TransferError::Negotiation(
                NegotiationError::AttributeRejected { .. } | NegotiationError::Unreachable { .. },
            ) => false,
            _ => true,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocketError(err.to_string())
    }
}
