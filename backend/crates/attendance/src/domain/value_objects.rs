//! Domain Value Objects
//!
//! Immutable value types for the attendance domain.

use std::fmt;

use derive_more::Display;
use platform::secret::{SecretBytes, SecretError};
use serde::{Deserialize, Serialize};

pub use kernel::id::{LocalScanId, StudentId};

// ============================================================================
// ScanOutcome
// ============================================================================

/// What the operator is shown for one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    /// First valid scan of the period
    #[display("success")]
    Success,
    /// Already recorded
    #[display("warning")]
    Warning,
    /// Credential valid, account delinquent; entry blocked
    #[display("debe")]
    Debe,
    /// Credential invalid or unrecognized
    #[display("error")]
    Error,
}

impl ScanOutcome {
    /// Parse the backend's status string; anything unknown is an error
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Self::Success,
            "warning" => Self::Warning,
            "debe" | "blocked" => Self::Debe,
            _ => Self::Error,
        }
    }

    /// Attendance was (or already had been) recorded
    pub const fn is_attendance(&self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }
}

// ============================================================================
// DirectoryStatus
// ============================================================================

/// Last known server-computed eligibility of a student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryStatus {
    #[default]
    Ok,
    Warning,
    Debe,
}

impl DirectoryStatus {
    /// Parse the snapshot's status string
    ///
    /// Unknown codes are treated as blocked: a cache that cannot say the
    /// student is in good standing must not let them in.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "ok" | "success" => Self::Ok,
            "warning" => Self::Warning,
            _ => Self::Debe,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Debe => "debe",
        }
    }

    pub const fn outcome(&self) -> ScanOutcome {
        match self {
            Self::Ok => ScanOutcome::Success,
            Self::Warning => ScanOutcome::Warning,
            Self::Debe => ScanOutcome::Debe,
        }
    }
}

// ============================================================================
// ScanSource
// ============================================================================

/// Which input produced a raw scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ScanSource {
    #[display("camera")]
    Camera,
    #[display("nfc")]
    Nfc,
}

// ============================================================================
// SigningKey
// ============================================================================

/// Symmetric key used only to verify credential signatures
///
/// Session-scoped: zeroized when the last holder drops it.
pub struct SigningKey(SecretBytes);

impl SigningKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SecretError> {
        SecretBytes::new(bytes).map(Self)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        SecretBytes::from_base64(encoded).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Loggable identifier of the key
    pub fn fingerprint(&self) -> String {
        self.0.fingerprint()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({})", self.fingerprint())
    }
}
