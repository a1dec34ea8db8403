//! Attendance Error Types
//!
//! This module provides attendance-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.
//!
//! Two families are kept apart on purpose:
//! - [`CredentialError`]: why a scanned credential was rejected. These never
//!   leave the scanner as errors; they become the `error` outcome.
//! - [`AttendanceError`]: infrastructure failures (network, backend, disk).

use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::storage::StorageError;
use thiserror::Error;

/// Attendance-specific result type alias
pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Reasons a scanned credential is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Text carries the signed prefix but not the signed layout
    #[error("Malformed credential: {0}")]
    Format(&'static str),

    /// Embedded name is not valid base64url or not UTF-8
    #[error("Credential name is not valid base64url UTF-8")]
    NameEncoding,

    /// Signature does not match the one recomputed with the local key
    #[error("Credential signature mismatch")]
    Signature,

    /// No coach session has provisioned a signing key
    #[error("No signing key available")]
    NoSigningKey,
}

impl CredentialError {
    /// Log the rejection; signature failures are kept apart for auditing
    pub fn log(&self, payload_len: usize) {
        match self {
            CredentialError::Signature => {
                tracing::warn!(payload_len, "Rejected credential: signature mismatch");
            }
            CredentialError::NoSigningKey => {
                tracing::warn!("Rejected signed credential: no signing key provisioned");
            }
            CredentialError::Format(reason) => {
                tracing::info!(payload_len, reason = *reason, "Rejected credential: format mismatch");
            }
            CredentialError::NameEncoding => {
                tracing::info!(payload_len, "Rejected credential: undecodable name");
            }
        }
    }
}

/// Attendance infrastructure errors
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// No coach token to authenticate a batch
    #[error("No coach session token")]
    MissingToken,

    /// Connection could not be established or was lost
    #[error("Backend unreachable: {0}")]
    Network(String),

    /// Request exceeded its time budget
    #[error("Backend request timed out")]
    Timeout,

    /// Backend answered with a non-success status
    #[error("Backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Backend answered 2xx with a body we cannot read
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Local durable state could not be read or written
    #[error("Local storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::MissingToken => ErrorKind::Unauthorized,
            AttendanceError::Network(_) => ErrorKind::ServiceUnavailable,
            AttendanceError::Timeout => ErrorKind::RequestTimeout,
            AttendanceError::Rejected { status, .. } => ErrorKind::from_status_code(*status),
            AttendanceError::MalformedResponse(_) => ErrorKind::BadGateway,
            AttendanceError::Storage(_) | AttendanceError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// The backend could not be reached at all (as opposed to answering "no")
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AttendanceError::Network(_) | AttendanceError::Timeout)
    }

    /// Worth retrying later without any other change
    pub fn is_retryable(&self) -> bool {
        self.is_connectivity() || self.kind().is_retryable()
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            AttendanceError::MissingToken => err.with_action("Log in again as a coach"),
            e if e.is_connectivity() => {
                err.with_action("Scans are kept locally and will sync when the network returns")
            }
            AttendanceError::Storage(_) => {
                err.with_action("Check that SCANNER_DATA_DIR is writable and not full")
            }
            _ => err,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            AttendanceError::Storage(e) => {
                tracing::error!(error = %e, "Attendance storage error");
            }
            AttendanceError::Internal(msg) => {
                tracing::error!(message = %msg, "Attendance internal error");
            }
            AttendanceError::Rejected { status, .. } => {
                tracing::warn!(status, error = %self, "Backend rejected request");
            }
            AttendanceError::MalformedResponse(_) => {
                tracing::warn!(error = %self, "Backend response not understood");
            }
            _ => {
                tracing::debug!(error = %self, "Attendance backend unavailable");
            }
        }
    }
}

impl From<AttendanceError> for AppError {
    fn from(err: AttendanceError) -> Self {
        let app_err = err.to_app_error();
        app_err.with_source(err)
    }
}

impl From<reqwest::Error> for AttendanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AttendanceError::Timeout;
        }
        if let Some(status) = err.status() {
            return AttendanceError::Rejected {
                status: status.as_u16(),
                body: String::new(),
            };
        }
        if err.is_decode() {
            return AttendanceError::MalformedResponse(err.to_string());
        }
        if err.is_builder() {
            return AttendanceError::Internal(err.to_string());
        }
        AttendanceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AttendanceError {
    fn from(err: serde_json::Error) -> Self {
        AttendanceError::MalformedResponse(err.to_string())
    }
}
