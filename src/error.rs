//! Error types for slurp
//!
//! This module provides the error taxonomy used across the crate:
//! - [`Error`]: top-level error returned by configuration, manifest and run operations
//! - [`NntpError`]: protocol failures, classified at the client boundary into
//!   recoverable (try the next group) and fatal (abort the file or the run)
//! - [`YencError`]: codec failures for a single segment body
//! - [`ExitStatus`] / [`ToExitCode`]: process exit code mapping

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for slurp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for slurp
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// NNTP protocol or connection error that escaped per-segment handling
    #[error("NNTP error: {0}")]
    Nntp(#[from] NntpError),

    /// Invalid NZB manifest
    #[error("invalid NZB: {0}")]
    InvalidNzb(String),

    /// Failed to stage, read or remove a segment file
    #[error("staging error for {path}: {source}")]
    Staging {
        /// The staged segment path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was interrupted before it finished
    #[error("run cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Protocol-level failures, classified at the NNTP client boundary.
///
/// Raw transport errors never leave the client as anything other than one of
/// these variants.
#[derive(Debug, Error)]
pub enum NntpError {
    /// TCP connection (or TLS handshake) could not be established
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// `host:port` that was dialled
        address: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// TLS setup failed
    #[error("TLS error for {host}: {reason}")]
    Tls {
        /// Server hostname used for certificate validation
        host: String,
        /// Description of the failure
        reason: String,
    },

    /// Server rejected the credentials
    #[error("authentication rejected ({code}): {message}")]
    Auth {
        /// NNTP response code
        code: u16,
        /// Server response text
        message: String,
    },

    /// Group could not be selected
    #[error("cannot select group {group} ({code}): {message}")]
    Group {
        /// Newsgroup name
        group: String,
        /// NNTP response code
        code: u16,
        /// Server response text
        message: String,
    },

    /// Article is not available in the selected group or on the server
    #[error("article {message_id} not found ({code})")]
    NotFound {
        /// Message-ID that was requested
        message_id: String,
        /// NNTP response code
        code: u16,
    },

    /// Recoverable per-request failure (server busy, temporary outage, dropped body)
    #[error("transient server error ({code}): {message}")]
    Transient {
        /// NNTP response code (0 when the failure was not a response)
        code: u16,
        /// Description of the failure
        message: String,
    },

    /// Unexpected response that makes the connection unusable
    #[error("unexpected response ({code}): {message}")]
    Protocol {
        /// NNTP response code
        code: u16,
        /// Server response text
        message: String,
    },

    /// Message-ID cannot be sent on a command line
    #[error("invalid message-id {0:?}")]
    InvalidMessageId(String),

    /// An operation did not complete within its timeout
    #[error("timed out while {0}")]
    Timeout(String),

    /// I/O error on an established connection
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// NNTP response code for "no such newsgroup"
pub const NO_SUCH_GROUP: u16 = 411;

impl NntpError {
    /// Whether the failure only concerns the current group/segment attempt.
    ///
    /// Recoverable errors make the scheduler move on to the next candidate
    /// group for the segment; everything else aborts the current file.
    pub fn is_recoverable(&self) -> bool {
        match self {
            NntpError::NotFound { .. } => true,
            NntpError::Transient { .. } => true,
            NntpError::Group { code, .. } => *code == NO_SUCH_GROUP,
            // Losing the connection after the handshake only costs this attempt
            NntpError::Io(_) | NntpError::Timeout(_) => true,
            NntpError::Connect { .. }
            | NntpError::Tls { .. }
            | NntpError::Auth { .. }
            | NntpError::Protocol { .. }
            | NntpError::InvalidMessageId(_) => false,
        }
    }

    /// Whether the failure makes every further request pointless.
    ///
    /// Retrying with the same credentials cannot succeed, so authentication
    /// failures abort the whole run, not just the current file.
    pub fn aborts_run(&self) -> bool {
        matches!(self, NntpError::Auth { .. })
    }
}

/// yEnc codec failures for a single staged segment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum YencError {
    /// Body is missing its `=ybegin` header or `=yend` trailer
    #[error("malformed yEnc body: {0}")]
    Malformed(String),

    /// Decoded payload does not match the trailer checksum
    #[error("CRC32 mismatch: trailer says {expected:08x}, decoded data is {actual:08x}")]
    ChecksumMismatch {
        /// Checksum declared by the trailer
        expected: u32,
        /// Checksum of the decoded bytes
        actual: u32,
    },
}

/// Process-level outcome of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every selected file was reassembled
    Success,
    /// A fatal condition stopped a file or the run
    Fatal,
    /// Bad flags or configuration
    Usage,
    /// Nothing fatal happened but at least one file is incomplete
    Incomplete,
    /// Interrupted by a signal
    Cancelled,
}

/// Map outcomes and errors to process exit codes
pub trait ToExitCode {
    /// Get the process exit code
    fn exit_code(&self) -> u8;
}

impl ToExitCode for ExitStatus {
    fn exit_code(&self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::Usage => 2,
            ExitStatus::Incomplete => 3,
            ExitStatus::Cancelled => 130,
        }
    }
}

impl From<&Error> for ExitStatus {
    fn from(error: &Error) -> Self {
        match error {
            Error::Config { .. } | Error::InvalidNzb(_) | Error::Serialization(_) => {
                ExitStatus::Usage
            }
            Error::Cancelled => ExitStatus::Cancelled,
            Error::Nntp(_)
            | Error::Staging { .. }
            | Error::Io(_)
            | Error::Other(_) => ExitStatus::Fatal,
        }
    }
}

impl ToExitCode for Error {
    fn exit_code(&self) -> u8 {
        ExitStatus::from(self).exit_code()
    }
}
