//! Repository Traits
//!
//! Interfaces for local persistence and the remote backend. Implementations
//! are in the infrastructure layer.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::domain::entities::{BatchAck, DirectoryEntry, DirectorySnapshot, PendingScan, ServerVerdict};
use crate::domain::value_objects::{LocalScanId, StudentId};
use crate::error::AttendanceResult;

/// Durable pending-scan store, keyed by `local_id`
#[trait_variant::make(PendingScanRepository: Send)]
pub trait LocalPendingScanRepository {
    /// Insert or overwrite the record with the same `local_id`
    async fn upsert(&self, scan: &PendingScan) -> AttendanceResult<()>;

    /// Every record, synced or not, in insertion order
    async fn list(&self) -> AttendanceResult<Vec<PendingScan>>;

    /// Flip `synced` for the given ids; returns how many existed
    async fn mark_synced(&self, ids: &HashSet<LocalScanId>) -> AttendanceResult<usize>;

    /// Delete synced records captured before `day`; returns how many
    async fn remove_synced_before(&self, day: NaiveDate) -> AttendanceResult<usize>;
}

/// Durable directory snapshot store
#[trait_variant::make(DirectoryRepository: Send)]
pub trait LocalDirectoryRepository {
    async fn load(&self) -> AttendanceResult<DirectorySnapshot>;

    /// Replace the whole snapshot
    async fn replace(&self, snapshot: &DirectorySnapshot) -> AttendanceResult<()>;
}

/// Remote attendance backend
#[trait_variant::make(AttendanceApi: Send)]
pub trait LocalAttendanceApi {
    /// `POST /attendance/scan`
    async fn submit_scan(&self, code: &str) -> AttendanceResult<ServerVerdict>;

    /// `GET /attendance/scanner/offline-data`
    async fn fetch_directory(&self) -> AttendanceResult<HashMap<StudentId, DirectoryEntry>>;

    /// `POST /attendance/sync-batch`
    async fn sync_batch(&self, records: &[PendingScan], token: &str) -> AttendanceResult<BatchAck>;
}
