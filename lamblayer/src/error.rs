//! Error types for the lamblayer CLI.
//!
//! This module defines the semantic error variants surfaced to the user when
//! a layer cannot be created. Component-level errors from the archiver and the
//! remote package fetcher convert into [`LamblayerError`] so that the binary
//! only ever reports one error type.

use crate::archive::ArchiveError;
use crate::fetch::FetchError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while creating a layer.
#[derive(Debug, Error)]
pub enum LamblayerError {
    /// Mutually exclusive options were combined, or a required one is missing.
    #[error("{message}")]
    InvalidOption {
        /// Description of the option problem.
        message: String,
    },

    /// A configuration field is missing or has the wrong JSON type.
    #[error(
        "parameter validation failed: invalid type for parameter {param}, \
         value: {value}, type: {actual_type}, valid types: {expected}"
    )]
    ParamValidation {
        /// Name of the offending field, as written in the config file.
        param: String,
        /// JSON rendering of the actual value, or `None` when absent.
        value: String,
        /// JSON type of the actual value.
        actual_type: &'static str,
        /// Accepted JSON type(s).
        expected: &'static str,
    },

    /// The remote build service failed or produced an unusable artefact.
    #[error("failed to create layer: {reason}")]
    CreateLayer {
        /// Description of the failure.
        reason: String,
    },

    /// The remote build did not finish before the poll timeout elapsed.
    #[error("timed out after {elapsed_secs}s waiting for the remote package build")]
    PollTimedOut {
        /// Seconds spent waiting before giving up.
        elapsed_secs: u64,
    },

    /// The requested or resolved region does not host AWS Lambda.
    #[error("got invalid region name: {region}")]
    InvalidRegion {
        /// The rejected region name.
        region: String,
    },

    /// A configuration file could not be read.
    #[error("failed to read config file {path}")]
    ConfigRead {
        /// Path to the unreadable file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON.
    #[error("config file {path} is not valid JSON: {source}")]
    ConfigParse {
        /// Path to the malformed file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Building the zip archive failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The cloud session could not be initialised.
    #[error("failed to initialise cloud session: {reason}")]
    Session {
        /// Description of the failure.
        reason: String,
    },

    /// The layer publish call was rejected.
    #[error("failed to publish layer version: {reason}")]
    Publish {
        /// Description of the failure, including the provider's error context.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl LamblayerError {
    /// Build a [`LamblayerError::InvalidOption`] from a message.
    #[must_use]
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }
}

impl From<FetchError> for LamblayerError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::TimedOut { elapsed } => Self::PollTimedOut {
                elapsed_secs: elapsed.as_secs(),
            },
            other => Self::CreateLayer {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias using [`LamblayerError`].
pub type Result<T> = std::result::Result<T, LamblayerError>;
