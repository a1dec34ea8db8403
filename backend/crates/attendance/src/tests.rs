//! Crate-level tests: codec properties and end-to-end scanner scenarios

#[cfg(test)]
mod codec_property_tests {
    use crate::codec::*;
    use crate::testing::{TEST_KEY, signed, test_key};
    use chrono::{Duration, NaiveDate};

    fn samples() -> Vec<(String, NaiveDate, String)> {
        let base = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        [
            ("1", "Ana"),
            ("a1b2c3d4-0000-4000-8000-000000000042", "José Ñúñez"),
            ("77", "Zoë O'Brien-Smith"),
            ("student_9", "李小龙"),
            ("x", "A"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (id, name))| {
            (
                id.to_string(),
                base + Duration::days(37 * i as i64),
                name.to_string(),
            )
        })
        .collect()
    }

    #[test]
    fn test_verify_returns_plaintext_components() {
        for (id, date, name) in samples() {
            let text = signed(&id, date, &name);
            let cred = verify(&parse_signed(extract_payload(&text)).unwrap(), Some(&test_key())).unwrap();
            assert_eq!(cred.student_id.as_str(), id);
            assert_eq!(cred.valid_until, date);
            assert_eq!(cred.display_name, name);
        }
    }

    #[test]
    fn test_any_signature_byte_mutation_is_rejected() {
        for (id, date, name) in samples() {
            let fields = parse_signed(&signed(&id, date, &name)).unwrap();
            let sig = from_hex(&fields.signature_hex).unwrap();
            for i in 0..sig.len() {
                for flip in [0x01u8, 0x80, 0xff] {
                    let mut tampered = sig.clone();
                    tampered[i] ^= flip;
                    let mut f = fields.clone();
                    f.signature_hex = to_hex(&tampered);
                    assert!(verify(&f, Some(&test_key())).is_err());
                }
            }
        }
    }

    #[test]
    fn test_name_swap_is_rejected() {
        let fields = parse_signed(&signed("1", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), "Ana")).unwrap();
        let mut forged = fields.clone();
        forged.name_encoded = to_base64url("Luis".as_bytes());
        assert!(verify(&forged, Some(&test_key())).is_err());
        assert!(verify(&fields, Some(&test_key())).is_ok());
    }

    #[test]
    fn test_expiry_boundary_for_many_days() {
        let start = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        for offset in 0..20 {
            let today = start + Duration::days(offset);
            let noon = today.and_hms_opt(12, 0, 0).unwrap();
            assert!(is_expired(today - Duration::days(1), noon));
            assert!(!is_expired(today, noon));
            assert!(!is_expired(today, today.and_hms_opt(23, 59, 59).unwrap()));
        }
    }

    #[test]
    fn test_issuer_key_matches_fixture() {
        // the fixture key is the one the tests sign with
        assert_eq!(test_key().as_bytes(), TEST_KEY);
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tokio::sync::Notify;

    use crate::application::clock::Clock;
    use crate::domain::entities::BatchAck;
    use crate::domain::value_objects::{ScanOutcome, StudentId};
    use crate::infra::memory::{InMemoryDirectoryRepository, InMemoryPendingScanRepository};
    use crate::testing::{FakeAttendanceApi, FixedClock, local, signed, test_key};
    use crate::{
        CoachSession, Connectivity, DirectoryCache, FlushOutcome, PendingScanQueue, RawScan, Resolution,
        ScanOrchestrator, ScannerConfig, SigningKeyStore, SyncEngine, SyncReport,
    };

    struct Scanner {
        api: Arc<FakeAttendanceApi>,
        queue: Arc<PendingScanQueue<InMemoryPendingScanRepository>>,
        connectivity: Arc<Connectivity>,
        engine: Arc<SyncEngine<FakeAttendanceApi, InMemoryPendingScanRepository>>,
        orchestrator:
            ScanOrchestrator<FakeAttendanceApi, InMemoryPendingScanRepository, InMemoryDirectoryRepository>,
    }

    /// Scanner wired like the binary, offline, on 2025-03-14 18:00 local
    async fn offline_scanner() -> Scanner {
        let api = FakeAttendanceApi::shared();
        api.set_offline(true);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(local(2025, 3, 14, 18, 0)));

        let queue = Arc::new(
            PendingScanQueue::open(Arc::new(InMemoryPendingScanRepository::new()))
                .await
                .unwrap(),
        );
        let directory = Arc::new(
            DirectoryCache::open(api.clone(), Arc::new(InMemoryDirectoryRepository::new()))
                .await
                .unwrap(),
        );
        let keys = Arc::new(SigningKeyStore::new());
        keys.provision(CoachSession::new("coach-token", Some(test_key())));
        let connectivity = Arc::new(Connectivity::new(false));

        let engine = Arc::new(
            SyncEngine::new(api.clone(), queue.clone(), keys.clone(), connectivity.clone())
                .with_clock(clock.clone()),
        );
        let orchestrator = ScanOrchestrator::new(
            api.clone(),
            queue.clone(),
            directory,
            keys,
            connectivity.clone(),
            engine.trigger(),
            &ScannerConfig::default(),
        )
        .with_clock(clock);

        Scanner {
            api,
            queue,
            connectivity,
            engine,
            orchestrator,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_a_offline_signed_scan_is_queued() {
        let mut scanner = offline_scanner().await;
        let text = signed("1042", day(2025, 4, 14), "Ana Pérez");

        let feedback = scanner.orchestrator.handle(RawScan::camera(text)).await.unwrap();

        assert_eq!(feedback.outcome, ScanOutcome::Success);
        assert_eq!(feedback.name, "Ana Pérez");
        assert!(matches!(feedback.resolution, Resolution::Queued(_)));
        let pending = scanner.queue.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].student_id, StudentId::new("1042"));
        assert!(scanner.api.scan_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_b_repeat_within_cooldown_is_ignored() {
        let mut scanner = offline_scanner().await;
        let text = signed("1042", day(2025, 4, 14), "Ana Pérez");

        assert!(scanner.orchestrator.handle(RawScan::camera(text.clone())).await.is_some());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(scanner.orchestrator.handle(RawScan::nfc(text)).await.is_none());

        assert_eq!(scanner.queue.list_pending().await.unwrap().len(), 1);
        assert_eq!(scanner.orchestrator.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_c_expired_yesterday_is_debe_without_queue() {
        let mut scanner = offline_scanner().await;
        let text = signed("1042", day(2025, 3, 13), "Ana Pérez");

        let feedback = scanner.orchestrator.handle(RawScan::camera(text)).await.unwrap();

        assert_eq!(feedback.outcome, ScanOutcome::Debe);
        assert_eq!(feedback.name, "Ana Pérez");
        assert_eq!(scanner.queue.pending_count(), 0);
        assert!(scanner.queue.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_d_corrupted_signature_is_error_without_queue() {
        let mut scanner = offline_scanner().await;
        let text = signed("1042", day(2025, 4, 14), "Ana Pérez");
        // flip one hex digit of the last signature byte
        let mut corrupted = text.clone();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == '0' { '1' } else { '0' });

        let feedback = scanner.orchestrator.handle(RawScan::camera(corrupted)).await.unwrap();

        assert_eq!(feedback.outcome, ScanOutcome::Error);
        assert_eq!(feedback.resolution, Resolution::Local);
        assert_eq!(scanner.queue.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_e_flush_acknowledges_all_submitted() {
        let scanner = offline_scanner().await;
        for (i, id) in ["1", "2", "3"].iter().enumerate() {
            scanner
                .queue
                .enqueue(StudentId::new(*id), local(2025, 3, 14, 9, i as u32))
                .await
                .unwrap();
        }
        assert_eq!(scanner.queue.pending_count(), 3);

        // offline flush fails and changes nothing
        assert!(scanner.engine.flush("coach-token").await.is_err());
        assert_eq!(scanner.queue.pending_count(), 3);

        scanner.api.set_offline(false);
        scanner.connectivity.set_online(true);
        scanner.api.set_batch_ack(BatchAck {
            inserted: 2,
            duplicates: 1,
        });

        let outcome = scanner.engine.flush_session().await.unwrap();
        assert_eq!(
            outcome,
            FlushOutcome::Flushed(SyncReport {
                submitted: 3,
                inserted: 2,
                duplicates: 1
            })
        );
        assert_eq!(scanner.queue.pending_count(), 0);
        assert!(scanner.queue.list_pending().await.unwrap().is_empty());

        let submitted: HashSet<_> = scanner.api.batch_calls()[0].iter().cloned().collect();
        assert_eq!(submitted.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_session_replays_after_reconnect() {
        let mut scanner = offline_scanner().await;
        let directory = Arc::new(
            DirectoryCache::open(scanner.api.clone(), Arc::new(InMemoryDirectoryRepository::new()))
                .await
                .unwrap(),
        );
        let shutdown = Arc::new(Notify::new());
        let handle = scanner.engine.clone().spawn(
            directory,
            ScannerConfig::default().sync,
            shutdown.clone(),
        );

        for (id, name) in [("1", "Ana"), ("2", "Luis")] {
            let text = signed(id, day(2025, 4, 14), name);
            scanner.orchestrator.handle(RawScan::camera(text)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        assert_eq!(scanner.queue.pending_count(), 2);

        scanner.api.set_offline(false);
        scanner.connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(scanner.queue.pending_count(), 0);
        assert_eq!(scanner.api.batch_tokens(), vec!["coach-token"]);

        shutdown.notify_one();
        handle.await.unwrap();
    }
}
