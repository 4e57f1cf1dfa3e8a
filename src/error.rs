//! Error types for genbatch
//!
//! This module provides the error taxonomy for the orchestrator:
//! - [`Error`] is the crate-wide error returned by setup and persistence paths
//! - [`SubmissionError`] covers failures creating a remote job
//! - [`PollError`] covers transient failures checking a job's status
//! - [`DownloadError`] covers failures streaming an artifact to disk
//!
//! Only setup-time errors (see [`Error::is_setup_error`]) are meant to reach the
//! process boundary. Per-job errors are recorded on the job and logged.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for genbatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for genbatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.min_interval")
        key: Option<String>,
    },

    /// API credentials were not supplied
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(String),

    /// The curated input set was empty
    #[error("empty batch: no inputs to submit")]
    EmptyBatch,

    /// The persisted queue file could not be read or parsed
    #[error("queue file {path} is unusable: {reason}")]
    QueueFile {
        /// Path of the queue file
        path: PathBuf,
        /// Why it could not be used
        reason: String,
    },

    /// Creating a remote job failed
    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),

    /// Checking a remote job's status failed
    #[error("poll error: {0}")]
    Poll(#[from] PollError),

    /// Streaming an artifact failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was interrupted by a termination signal
    #[error("interrupted by signal")]
    Interrupted,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error happened before any remote work could start.
    ///
    /// Setup errors produce a non-zero exit code; everything else is a
    /// per-job outcome that is recorded and reported instead.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::MissingCredentials(_)
                | Error::EmptyBatch
                | Error::QueueFile { .. }
        )
    }
}

/// Failure creating a remote job
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The request never reached the service (DNS, refused, connect timeout).
    /// No job can have been created.
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// The request may have reached the service but the outcome is unknown
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service rejected our credentials
    #[error("authentication rejected ({status}): {message}")]
    Auth {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The service refused the job
    #[error("job rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The input asset could not be turned into a request payload
    #[error("invalid input {input_ref}: {reason}")]
    InvalidInput {
        /// The offending input reference
        input_ref: String,
        /// Why it could not be used
        reason: String,
    },

    /// The service answered with something we could not parse
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Transient failure checking a job's status
///
/// A poll error never changes the job record; the job is retried on the next pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// Network-level failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("status check returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The service answered with something we could not parse
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure streaming an artifact to disk
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The artifact server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Artifact URL
        url: String,
    },

    /// Network failure before or during the transfer
    #[error("transfer of {url} failed: {reason}")]
    Transport {
        /// Artifact URL
        url: String,
        /// Underlying error
        reason: String,
    },

    /// The transfer completed but produced no bytes
    #[error("empty response body from {url}")]
    EmptyBody {
        /// Artifact URL
        url: String,
    },

    /// Writing the artifact failed
    #[error("failed to write {path}: {source}")]
    Io {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
