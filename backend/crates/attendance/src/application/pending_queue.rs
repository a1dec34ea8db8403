//! Pending-Scan Queue
//!
//! Durable, idempotent store of attendance intents awaiting server
//! confirmation. Records are keyed by `local_id`, so re-queuing the same
//! logical scan overwrites instead of duplicating. Every mutation republishes
//! the pending count on a `watch` channel for the "N pending" indicator.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use tokio::sync::watch;

use crate::domain::entities::PendingScan;
use crate::domain::repository::PendingScanRepository;
use crate::domain::value_objects::{LocalScanId, StudentId};
use crate::error::AttendanceResult;

pub struct PendingScanQueue<R>
where
    R: PendingScanRepository,
{
    repo: Arc<R>,
    count_tx: watch::Sender<usize>,
}

impl<R> PendingScanQueue<R>
where
    R: PendingScanRepository,
{
    /// Wrap a store, publishing its current pending count
    pub async fn open(repo: Arc<R>) -> AttendanceResult<Self> {
        let initial = count_unsynced(&repo.list().await?);
        let (count_tx, _rx) = watch::channel(initial);
        if initial > 0 {
            tracing::info!(pending = initial, "Pending scans restored from disk");
        }
        Ok(Self { repo, count_tx })
    }

    /// Upsert an unsynced record for `(student_id, timestamp)`
    ///
    /// The id is derived from the arguments, so calling twice with the same
    /// pair leaves exactly one record.
    pub async fn enqueue(
        &self,
        student_id: StudentId,
        timestamp: DateTime<FixedOffset>,
    ) -> AttendanceResult<LocalScanId> {
        let scan = PendingScan::new(student_id, timestamp);
        self.repo.upsert(&scan).await?;
        let pending = self.publish_count().await?;
        tracing::info!(
            local_id = %scan.local_id,
            student_id = %scan.student_id,
            pending,
            "Scan queued"
        );
        Ok(scan.local_id)
    }

    /// Store an already-acknowledged record for a scan the backend accepted
    /// online
    ///
    /// Nothing is sent for it; it lets [`recorded_on`](Self::recorded_on)
    /// see that day's attendance once the scanner is offline.
    pub async fn record_confirmed(
        &self,
        student_id: StudentId,
        timestamp: DateTime<FixedOffset>,
    ) -> AttendanceResult<LocalScanId> {
        let mut scan = PendingScan::new(student_id, timestamp);
        scan.synced = true;
        self.repo.upsert(&scan).await?;
        self.publish_count().await?;
        tracing::debug!(local_id = %scan.local_id, "Online scan recorded locally");
        Ok(scan.local_id)
    }

    /// Number of unsynced records
    pub fn pending_count(&self) -> usize {
        *self.count_tx.borrow()
    }

    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Unsynced records, oldest first
    pub async fn list_pending(&self) -> AttendanceResult<Vec<PendingScan>> {
        let mut scans = self.repo.list().await?;
        scans.retain(|s| !s.synced);
        Ok(scans)
    }

    /// Mark exactly `ids` synced; unknown ids are ignored
    pub async fn mark_synced(&self, ids: &HashSet<LocalScanId>) -> AttendanceResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let marked = self.repo.mark_synced(ids).await?;
        if marked < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                marked,
                "Acknowledgment named ids not in the queue"
            );
        }
        self.publish_count().await?;
        Ok(marked)
    }

    /// Whether any record, synced or not, was captured for `student_id` on `day`
    pub async fn recorded_on(&self, student_id: &StudentId, day: NaiveDate) -> AttendanceResult<bool> {
        let scans = self.repo.list().await?;
        Ok(scans
            .iter()
            .any(|s| &s.student_id == student_id && s.captured_on() == day))
    }

    /// Drop synced records captured before `today`
    ///
    /// Same-day synced records are kept so a repeat scan still resolves as
    /// already registered while offline.
    pub async fn prune_synced(&self, today: NaiveDate) -> AttendanceResult<usize> {
        let removed = self.repo.remove_synced_before(today).await?;
        if removed > 0 {
            tracing::debug!(removed, "Pruned synced scans");
            self.publish_count().await?;
        }
        Ok(removed)
    }

    async fn publish_count(&self) -> AttendanceResult<usize> {
        let pending = count_unsynced(&self.repo.list().await?);
        self.count_tx.send_replace(pending);
        Ok(pending)
    }
}

fn count_unsynced(scans: &[PendingScan]) -> usize {
    scans.iter().filter(|s| !s.synced).count()
}
