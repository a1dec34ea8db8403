//! Offline Directory Cache
//!
//! Soft cache of `{student_id -> last known status}` used for legacy codes
//! when the backend is unreachable. Minutes of staleness are acceptable.
//! A refresh replaces the whole snapshot; entries are never merged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::entities::{DirectoryEntry, DirectorySnapshot};
use crate::domain::repository::{AttendanceApi, DirectoryRepository};
use crate::domain::value_objects::StudentId;
use crate::error::AttendanceResult;

pub struct DirectoryCache<A, D>
where
    A: AttendanceApi,
    D: DirectoryRepository,
{
    api: Arc<A>,
    repo: Arc<D>,
    snapshot: RwLock<Arc<DirectorySnapshot>>,
}

impl<A, D> DirectoryCache<A, D>
where
    A: AttendanceApi,
    D: DirectoryRepository,
{
    /// Load the last persisted snapshot
    pub async fn open(api: Arc<A>, repo: Arc<D>) -> AttendanceResult<Self> {
        let snapshot = repo.load().await?;
        tracing::debug!(entries = snapshot.entries.len(), "Directory snapshot loaded");
        Ok(Self {
            api,
            repo,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Fetch the full snapshot and swap it in
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> AttendanceResult<usize> {
        let entries = self.api.fetch_directory().await?;
        let snapshot = DirectorySnapshot::new(entries, Utc::now());
        self.repo.replace(&snapshot).await?;

        let count = snapshot.entries.len();
        *self.snapshot.write().await = Arc::new(snapshot);
        tracing::info!(entries = count, "Directory snapshot refreshed");
        Ok(count)
    }

    pub async fn lookup(&self, student_id: &StudentId) -> Option<DirectoryEntry> {
        self.snapshot.read().await.entries.get(student_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.fetched_at
    }
}
