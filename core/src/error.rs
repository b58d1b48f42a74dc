//! Error types for the REST client.
//!
//! # Design
//! Every failure a caller can observe is a `RestError`. Transport problems
//! keep their cause in `TransportError`; non-2xx responses carry the status
//! and, when the body was JSON, the parsed document. `ErrorKind` gives a
//! payload-free tag for matching and logging.

use std::io;

use thiserror::Error;

/// Errors delivered as the terminal item of a call.
#[derive(Debug, Error)]
pub enum RestError {
    /// `base_url + route` did not parse as an absolute URL.
    #[error("malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The transport failed before producing a status code.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered outside 200..=299.
    #[error("HTTP {status}")]
    HttpStatus {
        status: u16,
        json_payload: Option<serde_json::Value>,
    },

    /// A finished download could not be moved into the cache directory.
    #[error("could not persist downloaded file: {0}")]
    StorageFailure(#[source] io::Error),

    /// The response body is not valid JSON.
    #[error("response is not valid JSON: {0}")]
    ParseFailure(#[source] serde_json::Error),

    /// The JSON document did not have the expected shape.
    #[error("response did not decode: {0}")]
    DecodeFailure(#[source] DecodeError),
}

/// Payload-free classification of a `RestError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedUrl,
    Transport,
    HttpStatus,
    StorageFailure,
    ParseFailure,
    DecodeFailure,
}

impl RestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RestError::MalformedUrl { .. } => ErrorKind::MalformedUrl,
            RestError::Transport(_) => ErrorKind::Transport,
            RestError::HttpStatus { .. } => ErrorKind::HttpStatus,
            RestError::StorageFailure(_) => ErrorKind::StorageFailure,
            RestError::ParseFailure(_) => ErrorKind::ParseFailure,
            RestError::DecodeFailure(_) => ErrorKind::DecodeFailure,
        }
    }

    /// HTTP status, for `HttpStatus` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed JSON body of a failed response, when there was one.
    pub fn json_payload(&self) -> Option<&serde_json::Value> {
        match self {
            RestError::HttpStatus { json_payload, .. } => json_payload.as_ref(),
            _ => None,
        }
    }
}

/// Failures reported by a `Transport` or by the task machinery around it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport dropped its event sink without reporting an outcome.
    #[error("transport task ended without an outcome")]
    Aborted,

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A JSON value could not be turned into the requested model.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}
