//! In-Memory Repository Implementations
//!
//! Volatile stores for tests and for running without a data directory. The
//! list operations here are shared with the JSON file stores, which keep the
//! same in-memory list and persist it after each mutation.

use std::collections::HashSet;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::domain::entities::{DirectorySnapshot, PendingScan};
use crate::domain::repository::{DirectoryRepository, PendingScanRepository};
use crate::domain::value_objects::LocalScanId;
use crate::error::AttendanceResult;

/// Replace in place when the id exists, append otherwise
pub(crate) fn upsert_scan(scans: &mut Vec<PendingScan>, scan: &PendingScan) {
    match scans.iter_mut().find(|s| s.local_id == scan.local_id) {
        Some(existing) => *existing = scan.clone(),
        None => scans.push(scan.clone()),
    }
}

pub(crate) fn mark_scans_synced(scans: &mut [PendingScan], ids: &HashSet<LocalScanId>) -> usize {
    let mut marked = 0;
    for scan in scans.iter_mut().filter(|s| ids.contains(&s.local_id)) {
        scan.synced = true;
        marked += 1;
    }
    marked
}

pub(crate) fn remove_synced_scans_before(scans: &mut Vec<PendingScan>, day: NaiveDate) -> usize {
    let before = scans.len();
    scans.retain(|s| !(s.synced && s.captured_on() < day));
    before - scans.len()
}

#[derive(Debug, Default)]
pub struct InMemoryPendingScanRepository {
    scans: Mutex<Vec<PendingScan>>,
}

impl InMemoryPendingScanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingScanRepository for InMemoryPendingScanRepository {
    async fn upsert(&self, scan: &PendingScan) -> AttendanceResult<()> {
        upsert_scan(&mut *self.scans.lock().await, scan);
        Ok(())
    }

    async fn list(&self) -> AttendanceResult<Vec<PendingScan>> {
        Ok(self.scans.lock().await.clone())
    }

    async fn mark_synced(&self, ids: &HashSet<LocalScanId>) -> AttendanceResult<usize> {
        Ok(mark_scans_synced(&mut self.scans.lock().await, ids))
    }

    async fn remove_synced_before(&self, day: NaiveDate) -> AttendanceResult<usize> {
        Ok(remove_synced_scans_before(&mut *self.scans.lock().await, day))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectoryRepository {
    snapshot: Mutex<DirectorySnapshot>,
}

impl InMemoryDirectoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryRepository for InMemoryDirectoryRepository {
    async fn load(&self) -> AttendanceResult<DirectorySnapshot> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn replace(&self, snapshot: &DirectorySnapshot) -> AttendanceResult<()> {
        *self.snapshot.lock().await = snapshot.clone();
        Ok(())
    }
}
