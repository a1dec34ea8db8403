//! Scan Orchestrator
//!
//! State machine from raw scan text to operator feedback:
//!
//! ```text
//! Idle -> Processing -> Resolved(until) --cooldown--> Idle
//! ```
//!
//! Scans that arrive in any state other than `Idle` are dropped, so a tag
//! still in range cannot be read twice. Camera and NFC input arrive on the
//! same channel as [`RawScan`] values.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use crate::application::clock::{Clock, SystemClock};
use crate::application::config::ScannerConfig;
use crate::application::connectivity::Connectivity;
use crate::application::directory_cache::DirectoryCache;
use crate::application::history::ScanHistory;
use crate::application::key_store::SigningKeyStore;
use crate::application::pending_queue::PendingScanQueue;
use crate::domain::entities::{Credential, ServerVerdict};
use crate::domain::repository::{AttendanceApi, DirectoryRepository, PendingScanRepository};
use crate::domain::services::{extract_payload, has_signed_prefix, is_expired, parse_signed_strict, verify};
use crate::domain::value_objects::{ScanOutcome, ScanSource, StudentId};
use crate::error::{AttendanceError, CredentialError};
use crate::presentation::dto::UNKNOWN_NAME;
use crate::presentation::feedback::{Resolution, ScanFeedback};

/// One decoded read from an input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScan {
    pub source: ScanSource,
    pub text: String,
}

impl RawScan {
    pub fn camera(text: impl Into<String>) -> Self {
        Self {
            source: ScanSource::Camera,
            text: text.into(),
        }
    }

    pub fn nfc(text: impl Into<String>) -> Self {
        Self {
            source: ScanSource::Nfc,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Processing,
    Resolved { outcome: ScanOutcome, until: Instant },
}

/// What the run loop reports to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    Resolved(ScanFeedback),
    /// Cooldown over, input re-enabled
    Ready,
}

pub struct ScanOrchestrator<A, R, D>
where
    A: AttendanceApi,
    R: PendingScanRepository,
    D: DirectoryRepository,
{
    api: Arc<A>,
    queue: Arc<PendingScanQueue<R>>,
    directory: Arc<DirectoryCache<A, D>>,
    keys: Arc<SigningKeyStore>,
    connectivity: Arc<Connectivity>,
    sync_trigger: Arc<Notify>,
    clock: Arc<dyn Clock>,
    history: ScanHistory,
    state: ScannerState,
    cooldown: Duration,
    request_timeout: Duration,
}

impl<A, R, D> ScanOrchestrator<A, R, D>
where
    A: AttendanceApi,
    R: PendingScanRepository,
    D: DirectoryRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<A>,
        queue: Arc<PendingScanQueue<R>>,
        directory: Arc<DirectoryCache<A, D>>,
        keys: Arc<SigningKeyStore>,
        connectivity: Arc<Connectivity>,
        sync_trigger: Arc<Notify>,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            api,
            queue,
            directory,
            keys,
            connectivity,
            sync_trigger,
            clock: Arc::new(SystemClock),
            history: ScanHistory::new(config.history_limit, config.history_mode),
            state: ScannerState::Idle,
            cooldown: config.cooldown,
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn history(&self) -> &ScanHistory {
        &self.history
    }

    /// Leave `Resolved` once the cooldown has elapsed; true on that edge
    pub fn tick(&mut self) -> bool {
        match self.state {
            ScannerState::Resolved { until, .. } if Instant::now() >= until => {
                self.state = ScannerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Process one scan, or drop it when not `Idle`
    pub async fn handle(&mut self, scan: RawScan) -> Option<ScanFeedback> {
        self.tick();
        if self.state != ScannerState::Idle {
            tracing::debug!(source = %scan.source, state = ?self.state, "Scan dropped: scanner busy");
            return None;
        }

        self.state = ScannerState::Processing;
        let feedback = self.resolve(&scan).await;

        self.history.record(&feedback, self.clock.now());
        self.state = ScannerState::Resolved {
            outcome: feedback.outcome,
            until: Instant::now() + self.cooldown,
        };
        tracing::info!(
            source = %scan.source,
            outcome = %feedback.outcome,
            offline = feedback.resolution.is_offline(),
            "Scan resolved"
        );
        Some(feedback)
    }

    /// Drain `scans` until the channel closes or the receiver of `events` goes away
    pub async fn run(&mut self, mut scans: mpsc::Receiver<RawScan>, events: mpsc::Sender<ScannerEvent>) {
        loop {
            let cooldown_end = match self.state {
                ScannerState::Resolved { until, .. } => Some(until),
                _ => None,
            };

            tokio::select! {
                maybe = scans.recv() => {
                    let Some(scan) = maybe else { break };
                    if let Some(feedback) = self.handle(scan).await {
                        if events.send(ScannerEvent::Resolved(feedback)).await.is_err() {
                            break;
                        }
                    }
                }
                _ = sleep_until_opt(cooldown_end), if cooldown_end.is_some() => {
                    if self.tick() && events.send(ScannerEvent::Ready).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Scan input closed");
    }

    async fn resolve(&self, scan: &RawScan) -> ScanFeedback {
        let payload = extract_payload(&scan.text);
        if payload.is_empty() {
            return ScanFeedback::new(ScanOutcome::Error, "", Resolution::Local)
                .with_detail("Código vacío");
        }
        if has_signed_prefix(payload) {
            self.resolve_signed(payload).await
        } else {
            self.resolve_legacy(payload).await
        }
    }

    async fn resolve_signed(&self, payload: &str) -> ScanFeedback {
        let credential = match self.verify_locally(payload) {
            Ok(credential) => credential,
            Err(e) => {
                e.log(payload.len());
                return ScanFeedback::new(ScanOutcome::Error, "", Resolution::Local)
                    .with_detail(rejection_detail(&e));
            }
        };

        let now = self.clock.now();
        if is_expired(credential.valid_until, now.naive_local()) {
            tracing::info!(
                student_id = %credential.student_id,
                valid_until = %credential.valid_until,
                "Credential expired"
            );
            return ScanFeedback::new(ScanOutcome::Debe, credential.display_name, Resolution::Local)
                .with_detail(format!(
                    "Vigente hasta {}",
                    credential.valid_until.format("%d/%m/%Y")
                ));
        }

        if self.connectivity.is_online() {
            if let Some(verdict) = self.submit_online(payload).await {
                if verdict.outcome.is_attendance() {
                    self.remember_confirmed(&credential, now).await;
                }
                return server_feedback(verdict, &credential.display_name);
            }
        }

        self.accept_offline(credential, now).await
    }

    fn verify_locally(&self, payload: &str) -> Result<Credential, CredentialError> {
        let fields = parse_signed_strict(payload)?;
        let session = self.keys.current();
        verify(&fields, session.as_ref().and_then(|s| s.signing_key()))
    }

    /// Keep a synced local record so an offline rescan today is a repeat
    async fn remember_confirmed(
        &self,
        credential: &Credential,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) {
        if let Err(e) = self
            .queue
            .record_confirmed(credential.student_id.clone(), now)
            .await
        {
            e.log();
        }
    }

    async fn accept_offline(
        &self,
        credential: Credential,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) -> ScanFeedback {
        let Credential {
            student_id,
            display_name,
            ..
        } = credential;

        match self.queue.recorded_on(&student_id, now.date_naive()).await {
            Ok(true) => {
                tracing::info!(student_id = %student_id, "Already recorded today");
                return ScanFeedback::new(ScanOutcome::Warning, display_name, Resolution::Local);
            }
            Ok(false) => {}
            Err(e) => e.log(),
        }

        match self.queue.enqueue(student_id, now).await {
            Ok(local_id) => {
                if self.connectivity.is_online() {
                    self.sync_trigger.notify_one();
                }
                ScanFeedback::new(ScanOutcome::Success, display_name, Resolution::Queued(local_id))
            }
            Err(e) => {
                e.log();
                ScanFeedback::new(ScanOutcome::Error, display_name, Resolution::Local)
                    .with_detail("No se pudo guardar el registro")
            }
        }
    }

    async fn resolve_legacy(&self, payload: &str) -> ScanFeedback {
        if self.connectivity.is_online() {
            if let Some(verdict) = self.submit_online(payload).await {
                return server_feedback(verdict, UNKNOWN_NAME);
            }
        }

        match self.directory.lookup(&StudentId::new(payload)).await {
            Some(entry) => {
                let feedback = ScanFeedback::new(
                    entry.status.outcome(),
                    entry.display_name,
                    Resolution::Directory,
                );
                match entry.detail {
                    Some(detail) => feedback.with_detail(detail),
                    None => feedback,
                }
            }
            None => ScanFeedback::new(ScanOutcome::Error, "", Resolution::Local)
                .with_detail("Código sin firma: requiere conexión"),
        }
    }

    /// Direct submission; `None` means fall back to the offline path
    async fn submit_online(&self, code: &str) -> Option<ServerVerdict> {
        let result = match tokio::time::timeout(self.request_timeout, self.api.submit_scan(code)).await {
            Ok(result) => result,
            Err(_) => Err(AttendanceError::Timeout),
        };
        self.connectivity.report(&result);
        match result {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                e.log();
                None
            }
        }
    }
}

fn server_feedback(verdict: ServerVerdict, fallback_name: &str) -> ScanFeedback {
    let name = verdict
        .student_name
        .unwrap_or_else(|| fallback_name.to_string());
    let feedback = ScanFeedback::new(verdict.outcome, name, Resolution::Server);
    match verdict.detail {
        Some(detail) => feedback.with_detail(detail),
        None => feedback,
    }
}

fn rejection_detail(error: &CredentialError) -> &'static str {
    match error {
        CredentialError::Format(_) | CredentialError::NameEncoding => "Formato de credencial no reconocido",
        CredentialError::Signature => "Firma no válida",
        CredentialError::NoSigningKey => "Sin clave de verificación: inicie sesión",
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
