//! Sync Engine
//!
//! Drains the pending-scan queue to the backend in one batch per flush.
//!
//! ## Delivery
//! - Only an explicit backend acknowledgment marks records synced, and only
//!   the ids that were in the submitted snapshot. Scans queued mid-flush wait
//!   for the next cycle.
//! - A failed flush leaves the queue untouched for the next trigger.
//! - At most one flush runs at a time; an overlapping call is skipped.
//!
//! ## Triggers
//! The scheduler spawned by [`SyncEngine::spawn`] flushes on a jittered
//! timer, when woken after an enqueue, and on the offline to online edge.
//! It also refreshes the directory snapshot on its own period and on
//! reconnect.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use rand::Rng;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::application::clock::{Clock, SystemClock};
use crate::application::config::SyncSchedule;
use crate::application::connectivity::Connectivity;
use crate::application::directory_cache::DirectoryCache;
use crate::application::key_store::SigningKeyStore;
use crate::application::pending_queue::PendingScanQueue;
use crate::domain::repository::{AttendanceApi, DirectoryRepository, PendingScanRepository};
use crate::domain::value_objects::LocalScanId;
use crate::error::AttendanceResult;

const EVENT_CAPACITY: usize = 64;

/// Counts reported by the backend for one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub submitted: usize,
    pub inserted: u32,
    pub duplicates: u32,
}

/// Why a flush did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SyncSkip {
    #[display("no_token")]
    NoToken,
    #[display("in_flight")]
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed(SyncReport),
    Skipped(SyncSkip),
}

/// Background notifications for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Flushed { inserted: u32, duplicates: u32 },
    Failed { error: String },
    Skipped(SyncSkip),
    QueueCount(usize),
    WentOffline,
}

pub struct SyncEngine<A, R>
where
    A: AttendanceApi,
    R: PendingScanRepository,
{
    api: Arc<A>,
    queue: Arc<PendingScanQueue<R>>,
    keys: Arc<SigningKeyStore>,
    connectivity: Arc<Connectivity>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<()>,
    wake: Arc<Notify>,
    events: broadcast::Sender<SyncEvent>,
}

impl<A, R> SyncEngine<A, R>
where
    A: AttendanceApi,
    R: PendingScanRepository,
{
    pub fn new(
        api: Arc<A>,
        queue: Arc<PendingScanQueue<R>>,
        keys: Arc<SigningKeyStore>,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            queue,
            keys,
            connectivity,
            clock: Arc::new(SystemClock),
            in_flight: Mutex::new(()),
            wake: Arc::new(Notify::new()),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle that wakes the scheduler for an immediate flush
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Flush with the token of the current coach session
    pub async fn flush_session(&self) -> AttendanceResult<FlushOutcome> {
        match self.keys.token() {
            Some(token) => self.flush(&token).await,
            None => {
                tracing::debug!("Sync skipped: no coach session");
                self.emit(SyncEvent::Skipped(SyncSkip::NoToken));
                Ok(FlushOutcome::Skipped(SyncSkip::NoToken))
            }
        }
    }

    /// Submit every pending record as one batch
    ///
    /// An empty queue returns a zero report without touching the network.
    pub async fn flush(&self, token: &str) -> AttendanceResult<FlushOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("Sync skipped: flush already in flight");
            self.emit(SyncEvent::Skipped(SyncSkip::InFlight));
            return Ok(FlushOutcome::Skipped(SyncSkip::InFlight));
        };

        let pending = self.queue.list_pending().await?;
        if pending.is_empty() {
            return Ok(FlushOutcome::Flushed(SyncReport::default()));
        }

        let result = self.api.sync_batch(&pending, token).await;
        self.connectivity.report(&result);
        let ack = match result {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(pending = pending.len(), error = %e, "Sync batch failed; will retry");
                self.emit(SyncEvent::Failed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let ids: HashSet<LocalScanId> = pending.iter().map(|s| s.local_id.clone()).collect();
        self.queue.mark_synced(&ids).await?;

        let today = self.clock.now().date_naive();
        if let Err(e) = self.queue.prune_synced(today).await {
            e.log();
        }

        let report = SyncReport {
            submitted: pending.len(),
            inserted: ack.inserted,
            duplicates: ack.duplicates,
        };
        tracing::info!(
            submitted = report.submitted,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Pending scans synced"
        );
        self.emit(SyncEvent::Flushed {
            inserted: report.inserted,
            duplicates: report.duplicates,
        });
        self.emit(SyncEvent::QueueCount(self.queue.pending_count()));
        Ok(FlushOutcome::Flushed(report))
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<A, R> SyncEngine<A, R>
where
    A: AttendanceApi + Sync + 'static,
    R: PendingScanRepository + Sync + 'static,
{
    /// Run the scheduler until `shutdown` is notified
    pub fn spawn<D>(
        self: Arc<Self>,
        directory: Arc<DirectoryCache<A, D>>,
        schedule: SyncSchedule,
        shutdown: Arc<Notify>,
    ) -> JoinHandle<()>
    where
        D: DirectoryRepository + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut online_rx = self.connectivity.subscribe();
            let mut count_rx = self.queue.subscribe_count();

            let timer = tokio::time::sleep(next_delay(&schedule));
            tokio::pin!(timer);

            // First tick fires immediately: refresh on startup
            let mut refresh = tokio::time::interval(schedule.directory_refresh);
            refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_ms = schedule.interval.as_millis() as u64,
                jitter_ms = schedule.jitter.as_millis() as u64,
                "Sync scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("Sync scheduler stopping");
                        break;
                    }
                    () = &mut timer => {
                        self.scheduled_flush("timer").await;
                        timer.as_mut().reset(Instant::now() + next_delay(&schedule));
                    }
                    _ = self.wake.notified() => {
                        self.scheduled_flush("enqueue").await;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if !online {
                            self.emit(SyncEvent::WentOffline);
                        } else if schedule.trigger_on_reconnect {
                            self.scheduled_flush("reconnect").await;
                            refresh_directory(&directory).await;
                        }
                    }
                    Ok(()) = count_rx.changed() => {
                        let count = *count_rx.borrow_and_update();
                        self.emit(SyncEvent::QueueCount(count));
                    }
                    _ = refresh.tick() => {
                        refresh_directory(&directory).await;
                    }
                }
            }
        })
    }

    async fn scheduled_flush(&self, trigger: &'static str) {
        if let Err(e) = self.flush_session().await {
            tracing::debug!(trigger, retryable = e.is_retryable(), "Scheduled flush did not complete");
        }
    }
}

async fn refresh_directory<A, D>(directory: &DirectoryCache<A, D>)
where
    A: AttendanceApi,
    D: DirectoryRepository,
{
    if let Err(e) = directory.refresh().await {
        tracing::warn!(error = %e, "Directory refresh failed; keeping previous snapshot");
    }
}

/// `interval` plus a uniform random share of `jitter`
fn next_delay(schedule: &SyncSchedule) -> Duration {
    let jitter_ms = schedule.jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return schedule.interval;
    }
    schedule.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::key_store::CoachSession;
    use crate::domain::entities::BatchAck;
    use crate::domain::value_objects::StudentId;
    use crate::infra::memory::{InMemoryDirectoryRepository, InMemoryPendingScanRepository};
    use crate::testing::{FakeAttendanceApi, FixedClock, local};

    type Engine = SyncEngine<FakeAttendanceApi, InMemoryPendingScanRepository>;

    struct Fixture {
        api: Arc<FakeAttendanceApi>,
        queue: Arc<PendingScanQueue<InMemoryPendingScanRepository>>,
        keys: Arc<SigningKeyStore>,
        connectivity: Arc<Connectivity>,
        engine: Arc<Engine>,
    }

    async fn fixture() -> Fixture {
        let api = FakeAttendanceApi::shared();
        let queue = Arc::new(
            PendingScanQueue::open(Arc::new(InMemoryPendingScanRepository::new()))
                .await
                .unwrap(),
        );
        let keys = Arc::new(SigningKeyStore::new());
        keys.provision(CoachSession::new("tok", None));
        let connectivity = Arc::new(Connectivity::new(true));
        let engine = Arc::new(
            SyncEngine::new(api.clone(), queue.clone(), keys.clone(), connectivity.clone())
                .with_clock(Arc::new(FixedClock::new(local(2025, 3, 14, 12, 0)))),
        );
        Fixture {
            api,
            queue,
            keys,
            connectivity,
            engine,
        }
    }

    async fn enqueue(fx: &Fixture, student: &str, minute: u32) {
        fx.queue
            .enqueue(StudentId::new(student), local(2025, 3, 14, 9, minute))
            .await
            .unwrap();
    }

    fn quiet_schedule() -> SyncSchedule {
        SyncSchedule {
            interval: Duration::from_secs(15),
            jitter: Duration::ZERO,
            trigger_on_reconnect: true,
            directory_refresh: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_empty_queue_makes_no_network_call() {
        let fx = fixture().await;
        let outcome = fx.engine.flush("tok").await.unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed(SyncReport::default()));
        assert!(fx.api.batch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_success_marks_submitted_ids() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        enqueue(&fx, "2", 1).await;
        fx.api.set_batch_ack(BatchAck {
            inserted: 1,
            duplicates: 1,
        });

        let outcome = fx.engine.flush("tok").await.unwrap();
        assert_eq!(
            outcome,
            FlushOutcome::Flushed(SyncReport {
                submitted: 2,
                inserted: 1,
                duplicates: 1
            })
        );
        assert_eq!(fx.queue.pending_count(), 0);
        assert_eq!(fx.api.batch_calls()[0].len(), 2);
        assert_eq!(fx.api.batch_tokens(), vec!["tok"]);
    }

    #[tokio::test]
    async fn test_failure_leaves_queue_untouched() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        let mut events = fx.engine.subscribe();

        fx.api.set_offline(true);
        let err = fx.engine.flush("tok").await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(fx.queue.pending_count(), 1);
        assert!(!fx.connectivity.is_online());
        assert!(matches!(events.recv().await.unwrap(), SyncEvent::Failed { .. }));

        fx.api.set_offline(false);
        fx.api.fail_batches_with(Some(401));
        assert!(fx.engine.flush("bad").await.is_err());
        assert_eq!(fx.queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_no_token_skips() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        fx.keys.clear();
        assert_eq!(
            fx.engine.flush_session().await.unwrap(),
            FlushOutcome::Skipped(SyncSkip::NoToken)
        );
        assert!(fx.api.batch_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_flush_is_skipped() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        fx.api.set_batch_delay(Duration::from_secs(2));

        let (first, second) = tokio::join!(fx.engine.flush("tok"), fx.engine.flush("tok"));
        assert!(matches!(first.unwrap(), FlushOutcome::Flushed(r) if r.submitted == 1));
        assert_eq!(second.unwrap(), FlushOutcome::Skipped(SyncSkip::InFlight));
        assert_eq!(fx.api.batch_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_queued_mid_flush_waits_for_next_cycle() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        let snapshot = fx.queue.list_pending().await.unwrap();

        // a scan lands between the snapshot and the acknowledgment
        enqueue(&fx, "2", 1).await;
        let ids: HashSet<_> = snapshot.iter().map(|s| s.local_id.clone()).collect();
        fx.queue.mark_synced(&ids).await.unwrap();

        let left = fx.queue.list_pending().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].student_id.as_str(), "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_timer_flush() {
        let fx = fixture().await;
        enqueue(&fx, "1", 0).await;
        let directory = Arc::new(
            DirectoryCache::open(fx.api.clone(), Arc::new(InMemoryDirectoryRepository::new()))
                .await
                .unwrap(),
        );
        let shutdown = Arc::new(Notify::new());
        let handle = fx
            .engine
            .clone()
            .spawn(directory, quiet_schedule(), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fx.api.batch_calls().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fx.api.batch_calls().len(), 1);
        assert_eq!(fx.queue.pending_count(), 0);

        shutdown.notify_one();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_wake_and_reconnect() {
        let fx = fixture().await;
        let directory = Arc::new(
            DirectoryCache::open(fx.api.clone(), Arc::new(InMemoryDirectoryRepository::new()))
                .await
                .unwrap(),
        );
        let shutdown = Arc::new(Notify::new());
        let mut events = fx.engine.subscribe();
        let handle = fx
            .engine
            .clone()
            .spawn(directory.clone(), quiet_schedule(), shutdown.clone());

        // wake after enqueue
        enqueue(&fx, "1", 0).await;
        fx.engine.trigger().notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.api.batch_calls().len(), 1);

        // offline, queue, then reconnect
        fx.connectivity.set_online(false);
        enqueue(&fx, "2", 1).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.api.batch_calls().len(), 1);

        fx.api.set_directory([(
            "2",
            crate::testing::directory_entry(crate::domain::value_objects::DirectoryStatus::Ok, "Luis"),
        )]);
        fx.connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.api.batch_calls().len(), 2);
        assert!(directory.lookup(&StudentId::new("2")).await.is_some());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SyncEvent::WentOffline));
        assert!(seen.contains(&SyncEvent::QueueCount(0)));

        shutdown.notify_one();
        handle.await.unwrap();
    }

    #[test]
    fn test_next_delay_within_jitter() {
        let schedule = SyncSchedule {
            jitter: Duration::from_millis(1000),
            ..quiet_schedule()
        };
        for _ in 0..50 {
            let delay = next_delay(&schedule);
            assert!(delay >= schedule.interval);
            assert!(delay <= schedule.interval + schedule.jitter);
        }
        assert_eq!(next_delay(&quiet_schedule()), Duration::from_secs(15));
    }
}
