//! JSON File Repository Implementations
//!
//! The queue and the directory snapshot each live in one JSON document. The
//! document is loaded once on open; afterwards the in-memory copy is the
//! source of truth and every mutation rewrites the file atomically before
//! returning, so an acknowledged enqueue survives a restart.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use platform::storage::JsonFile;
use tokio::sync::Mutex;

use crate::domain::entities::{DirectorySnapshot, PendingScan};
use crate::domain::repository::{DirectoryRepository, PendingScanRepository};
use crate::domain::value_objects::LocalScanId;
use crate::error::AttendanceResult;
use crate::infra::memory::{mark_scans_synced, remove_synced_scans_before, upsert_scan};

/// Pending scans persisted as a JSON array, insertion order preserved
#[derive(Debug)]
pub struct JsonPendingScanRepository {
    file: JsonFile,
    scans: Mutex<Vec<PendingScan>>,
}

impl JsonPendingScanRepository {
    pub async fn open(path: impl Into<PathBuf>) -> AttendanceResult<Self> {
        let file = JsonFile::new(path);
        let scans: Vec<PendingScan> = file.load().await?.unwrap_or_default();
        tracing::debug!(path = %file.path().display(), records = scans.len(), "Opened pending-scan store");
        Ok(Self {
            file,
            scans: Mutex::new(scans),
        })
    }
}

impl PendingScanRepository for JsonPendingScanRepository {
    async fn upsert(&self, scan: &PendingScan) -> AttendanceResult<()> {
        let mut scans = self.scans.lock().await;
        let mut next = scans.clone();
        upsert_scan(&mut next, scan);
        self.file.save(&next).await?;
        *scans = next;
        Ok(())
    }

    async fn list(&self) -> AttendanceResult<Vec<PendingScan>> {
        Ok(self.scans.lock().await.clone())
    }

    async fn mark_synced(&self, ids: &HashSet<LocalScanId>) -> AttendanceResult<usize> {
        let mut scans = self.scans.lock().await;
        let mut next = scans.clone();
        let marked = mark_scans_synced(&mut next, ids);
        if marked > 0 {
            self.file.save(&next).await?;
            *scans = next;
        }
        Ok(marked)
    }

    async fn remove_synced_before(&self, day: NaiveDate) -> AttendanceResult<usize> {
        let mut scans = self.scans.lock().await;
        let mut next = scans.clone();
        let removed = remove_synced_scans_before(&mut next, day);
        if removed > 0 {
            self.file.save(&next).await?;
            *scans = next;
        }
        Ok(removed)
    }
}

/// Directory snapshot persisted as one JSON object
#[derive(Debug)]
pub struct JsonDirectoryRepository {
    file: JsonFile,
}

impl JsonDirectoryRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }
}

impl DirectoryRepository for JsonDirectoryRepository {
    async fn load(&self) -> AttendanceResult<DirectorySnapshot> {
        Ok(self.file.load().await?.unwrap_or_default())
    }

    async fn replace(&self, snapshot: &DirectorySnapshot) -> AttendanceResult<()> {
        self.file.save(snapshot).await?;
        Ok(())
    }
}
