//! Error types for the fileconv-client library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SessionError`] — the operation did not happen: an empty selection, an
//!   out-of-range index, a backend that answered with a non-200 status, a
//!   connection that dropped mid-upload. Returned as `Err(SessionError)` from
//!   every [`crate::session::UploadSession`] operation.
//!
//! * [`TransportError`] — the HTTP seam could not complete an exchange at all.
//!   It is always wrapped into [`SessionError::Transport`] before reaching
//!   the caller, and classified as a network failure.
//!
//! Per-item failures inside an otherwise successful compression batch are
//! *not* errors; they live in [`crate::output::ItemStatus`] so one bad file
//! never fails the whole batch.
//!
//! Every `SessionError` maps onto a [`FailureKind`] so the presentation layer
//! can pick a warning or an error notification without matching every variant.

use crate::tool::Tool;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used for user-facing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Caller input was rejected before any network traffic.
    Validation,
    /// The request never produced an HTTP response.
    Network,
    /// The backend answered, but not with something usable.
    Server,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => f.write_str("validation"),
            FailureKind::Network => f.write_str("network"),
            FailureKind::Server => f.write_str("server"),
        }
    }
}

/// All errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// `add_files` was called with nothing in it.
    #[error("No files selected")]
    EmptySelection,

    /// `submit` was called before any file was added.
    #[error("Select at least one file before running {tool}")]
    NoFiles { tool: Tool },

    /// Tool options failed validation (quality out of range, bad colour, …).
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Options of one tool were handed to another tool's session.
    #[error("{tool} does not accept {options} options")]
    OptionsMismatch { tool: Tool, options: &'static str },

    /// A file or result index does not exist.
    #[error("Index {index} is out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The batch row exists but has nothing to download.
    #[error("Row {row} ('{file}') has no download: status {status}")]
    NotDownloadable {
        row: usize,
        file: String,
        status: String,
    },

    /// A result operation was requested while no result is held.
    #[error("No result available; submit first")]
    NoResult,

    /// A submission is already in flight for this session.
    #[error("A submission is already in progress; reset the session to abandon it")]
    SubmitInFlight,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Selected file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading a selected file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Network / server errors ───────────────────────────────────────────
    /// The HTTP exchange itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Backend answered with anything but 200.
    #[error("Server returned HTTP {status} for {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    /// Backend answered 200 but the body does not have the expected shape.
    #[error("Unexpected response from {endpoint}: {detail}")]
    UnexpectedResponse { endpoint: String, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write a delivered artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refused to clobber an existing file.
    #[error("Output file '{path}' already exists (use --overwrite)")]
    OutputExists { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Classify the error for notification purposes.
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::Transport(_) => FailureKind::Network,
            SessionError::HttpStatus { .. }
            | SessionError::UnexpectedResponse { .. }
            | SessionError::Internal(_) => FailureKind::Server,
            _ => FailureKind::Validation,
        }
    }
}

/// Failure of a single HTTP exchange.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request could not be assembled (bad URL, bad header value).
    #[error("Failed to build request for '{url}': {reason}")]
    Request { url: String, reason: String },

    /// Connection refused, reset, DNS failure, TLS failure, …
    #[error("Could not reach '{url}': {reason}\nCheck that the conversion server is running.")]
    Connect { url: String, reason: String },

    /// The configured client-side timeout elapsed.
    #[error("Request to '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Headers arrived but the body could not be read.
    #[error("Failed to read response body from '{url}': {reason}")]
    Body { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_classify_as_validation() {
        assert_eq!(SessionError::EmptySelection.kind(), FailureKind::Validation);
        assert_eq!(
            SessionError::NoFiles {
                tool: Tool::MergePdf
            }
            .kind(),
            FailureKind::Validation
        );
        assert_eq!(
            SessionError::IndexOutOfRange { index: 3, len: 1 }.kind(),
            FailureKind::Validation
        );
    }

    #[test]
    fn transport_errors_classify_as_network() {
        let e: SessionError = TransportError::Connect {
            url: "http://127.0.0.1:8000/merge-pdf/".into(),
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(e.kind(), FailureKind::Network);
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn status_errors_classify_as_server() {
        let e = SessionError::HttpStatus {
            status: 500,
            endpoint: "/images-to-pdf/".into(),
        };
        assert_eq!(e.kind(), FailureKind::Server);
        assert!(e.to_string().contains("500"), "got: {e}");
    }

    #[test]
    fn no_files_mentions_tool() {
        let e = SessionError::NoFiles {
            tool: Tool::ImagesToPdf,
        };
        assert!(e.to_string().contains("images-to-pdf"), "got: {e}");
    }
}
