//! Domain Entities
//!
//! Core business entities for the attendance domain.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{DirectoryStatus, LocalScanId, ScanOutcome, StudentId};

/// Raw fields of a signed credential, split but not yet verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedFields {
    pub student_id: String,
    /// 8 ASCII digits, `YYYYMMDD`
    pub valid_date: String,
    /// URL-safe base64 of the UTF-8 display name
    pub name_encoded: String,
    /// Hex of the truncated MAC
    pub signature_hex: String,
}

/// Credential whose signature has been checked against the local key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub student_id: StudentId,
    /// Last day the credential is current (inclusive)
    pub valid_until: NaiveDate,
    pub display_name: String,
    pub signature: Vec<u8>,
}

/// Attendance intent awaiting server confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingScan {
    /// Idempotency key the server dedups on
    pub local_id: LocalScanId,
    pub student_id: StudentId,
    /// Capture time on the scanner's clock
    pub timestamp: DateTime<FixedOffset>,
    pub synced: bool,
}

impl PendingScan {
    /// Create an unsynced record with its id derived from `(student_id, timestamp)`
    pub fn new(student_id: StudentId, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            local_id: Self::derive_id(&student_id, &timestamp),
            student_id,
            timestamp,
            synced: false,
        }
    }

    /// `{student_id}_{unix_millis}`
    pub fn derive_id(student_id: &StudentId, timestamp: &DateTime<FixedOffset>) -> LocalScanId {
        LocalScanId::new(format!("{}_{}", student_id, timestamp.timestamp_millis()))
    }

    /// Calendar day of capture, in the offset it was captured in
    pub fn captured_on(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Cached eligibility of one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub status: DirectoryStatus,
    pub display_name: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Whole directory as last fetched; replaced wholesale, never merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub entries: HashMap<StudentId, DirectoryEntry>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl DirectorySnapshot {
    pub fn new(entries: HashMap<StudentId, DirectoryEntry>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            entries,
            fetched_at: Some(fetched_at),
        }
    }
}

/// The backend's answer to a single online scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVerdict {
    pub outcome: ScanOutcome,
    pub student_name: Option<String>,
    pub message: String,
    pub detail: Option<String>,
}

/// The backend's answer to a sync batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchAck {
    pub inserted: u32,
    pub duplicates: u32,
}
