//! Error type definitions for the aggregator
//!
//! This module defines the error types used throughout the crate. Only
//! `AppError` can terminate a run; the other enums describe per-entry and
//! per-attempt failures that are recorded and reported instead.

use std::time::Duration;

use thiserror::Error;

use crate::models::RunOutcome;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid configuration, detected before any probing begins
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The run deadline expired before a single probe completed.
    ///
    /// The partial outcome (every channel present, all without sources) is
    /// attached so the caller can still write an output document.
    #[error("Run deadline exhausted before any probe completed ({pending} URLs pending)")]
    DeadlineExhausted {
        pending: usize,
        partial: Box<RunOutcome>,
    },

    /// File system errors (CLI input/output)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// A raw entry that cannot be turned into a canonical channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// Display name is empty once decorations are stripped
    #[error("Malformed entry: empty channel name (raw: {raw:?})")]
    EmptyName { raw: String },

    /// No stream URL supplied
    #[error("Malformed entry: empty URL for channel {name:?}")]
    EmptyUrl { name: String },

    /// URL does not parse
    #[error("Malformed entry: invalid URL {url:?} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// URL scheme is not one of the configured stream schemes
    #[error("Malformed entry: unsupported scheme {scheme:?}")]
    UnsupportedScheme { scheme: String },
}

/// Failure of a single probe attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// Attempt exceeded its per-attempt timeout
    #[error("Probe timed out after {after:?}")]
    Timeout { after: Duration },

    /// Connection could not be established or broke mid-response
    #[error("Connection failure: {message}")]
    ConnectionFailure { message: String },

    /// Upstream answered with a status outside the acceptable set
    #[error("Unacceptable HTTP status: {status}")]
    HttpStatus { status: u16 },

    /// Upstream answered, but not with a media stream
    #[error("Not a media response: {detail}")]
    NonMedia { detail: String },

    /// Transport cannot handle this URL scheme
    #[error("Unsupported scheme for probe transport: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// ffprobe failed to run or reported an error
    #[error("ffprobe error: {message}")]
    Ffprobe { message: String },

    /// The run was cancelled while the attempt was in flight
    #[error("Probe cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error aborts the run before any output exists
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl EntryError {
    /// Short machine-friendly label used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            EntryError::EmptyName { .. } => "empty_name",
            EntryError::EmptyUrl { .. } => "empty_url",
            EntryError::InvalidUrl { .. } => "invalid_url",
            EntryError::UnsupportedScheme { .. } => "unsupported_scheme",
        }
    }
}

impl ProbeError {
    /// Create a connection failure from any displayable error
    pub fn connection<E: std::fmt::Display>(error: E) -> Self {
        Self::ConnectionFailure {
            message: error.to_string(),
        }
    }

    /// Create a non-media error
    pub fn non_media<S: Into<String>>(detail: S) -> Self {
        Self::NonMedia {
            detail: detail.into(),
        }
    }

    /// Whether this failure is a timeout (ProbeTimeout) as opposed to a
    /// connection or content failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
