//! Scanner Entry Point
//!
//! Wires the attendance services together and feeds them scans.
//! Camera decoders write one payload per line to stdin; an NFC reader
//! bridge can be attached through `SCANNER_NFC_BRIDGE`.
//! Failures are reported through `kernel::error::AppError` so the operator
//! sees what to do about them; `anyhow` only carries the exit status.

use std::path::PathBuf;
use std::sync::Arc;

use attendance::{
    CoachSession, Connectivity, DirectoryCache, HttpAttendanceApi, JsonDirectoryRepository,
    JsonPendingScanRepository, PendingScanQueue, RawScan, ScanOrchestrator, ScanSource, ScannerConfig,
    ScannerEvent, SigningKeyStore, SyncEngine, SyncEvent,
};
use kernel::error::{
    app_error::{AppError, AppResult, ResultExt},
    kind::ErrorKind,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SCAN_CHANNEL_CAPACITY: usize = 16;

type Queue = PendingScanQueue<JsonPendingScanRepository>;
type Directory = DirectoryCache<HttpAttendanceApi, JsonDirectoryRepository>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanner=info,attendance=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ScannerConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        data_dir = %config.data_dir.display(),
        history_mode = ?config.history_mode,
        "Starting scanner"
    );

    let api = Arc::new(
        HttpAttendanceApi::from_config(&config)
            .map_err(AppError::from)
            .inspect_err(report)?,
    );
    let (queue, directory) = open_local_state(&config, api.clone())
        .await
        .inspect_err(report)?;
    tracing::info!(
        pending = queue.pending_count(),
        entries = directory.len().await,
        last_refreshed = ?directory.last_refreshed().await,
        "Local state opened"
    );

    // Coach session
    let keys = Arc::new(SigningKeyStore::new());
    match config.token.as_deref() {
        Some(token) => match CoachSession::from_login(token, config.signing_key_b64.as_deref()) {
            Ok(session) => keys.provision(session),
            Err(e) => {
                tracing::warn!(error = %e, "Signing key rejected, signed credentials will not verify");
                keys.provision(CoachSession::new(token, None));
            }
        },
        None => {
            tracing::warn!("No SCANNER_TOKEN set, sync is paused and signed credentials will not verify");
        }
    }

    // Sync engine and scheduler
    let connectivity = Arc::new(Connectivity::default());
    let engine = Arc::new(SyncEngine::new(
        api.clone(),
        queue.clone(),
        keys.clone(),
        connectivity.clone(),
    ));
    let shutdown = Arc::new(Notify::new());
    let scheduler = engine
        .clone()
        .spawn(directory.clone(), config.sync.clone(), shutdown.clone());
    let sync_log = spawn_sync_logger(engine.subscribe());

    // Scan producers
    let (scan_tx, scan_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
    spawn_line_reader(tokio::io::stdin(), ScanSource::Camera, scan_tx.clone());
    if let Some(path) = config.nfc_bridge.clone() {
        spawn_nfc_bridge(path, scan_tx.clone());
    }
    drop(scan_tx);

    // Operator output
    let (event_tx, event_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
    let display = spawn_display(event_rx);

    let mut orchestrator = ScanOrchestrator::new(
        api,
        queue.clone(),
        directory,
        keys.clone(),
        connectivity,
        engine.trigger(),
        &config,
    );

    tracing::info!("Scanner ready");
    tokio::select! {
        _ = orchestrator.run(scan_rx, event_tx) => {
            tracing::info!("Scan sources closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    shutdown.notify_one();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "Sync scheduler ended abnormally");
    }

    // Last chance to drain the queue while the session is still loaded
    match engine.flush_session().await {
        Ok(outcome) => tracing::info!(?outcome, "Final sync"),
        Err(e) => {
            tracing::warn!(pending = queue.pending_count(), "Final sync failed, scans stay queued for next start");
            report(&AppError::from(e));
        }
    }
    keys.clear();

    print_history(&orchestrator);

    drop(orchestrator);
    drop(engine);
    let _ = display.await;
    sync_log.abort();

    Ok(())
}

async fn open_local_state(
    config: &ScannerConfig,
    api: Arc<HttpAttendanceApi>,
) -> AppResult<(Arc<Queue>, Arc<Directory>)> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_app_err(
            ErrorKind::InternalServerError,
            format!("Cannot create data directory {}", config.data_dir.display()),
        )
        .map_err(|e| e.with_action("Point SCANNER_DATA_DIR at a writable directory"))?;

    let repo = JsonPendingScanRepository::open(config.queue_path()).await?;
    let queue = Arc::new(PendingScanQueue::open(Arc::new(repo)).await?);
    let directory = Arc::new(
        DirectoryCache::open(api, Arc::new(JsonDirectoryRepository::new(config.directory_path()))).await?,
    );
    Ok((queue, directory))
}

/// Log the failure and tell the operator what to do about it
fn report(err: &AppError) {
    tracing::error!(
        kind = %err.kind(),
        retryable = err.is_retryable(),
        error = %err.message(),
        "Scanner error"
    );
    if let Some(action) = err.action() {
        println!("{err}: {action}");
    }
}

fn print_history(
    orchestrator: &ScanOrchestrator<HttpAttendanceApi, JsonPendingScanRepository, JsonDirectoryRepository>,
) {
    let history = orchestrator.history();
    if history.is_empty() {
        return;
    }
    println!("Últimos registros ({}):", history.len());
    for entry in history.entries() {
        println!("  {}  {}  {}", entry.time_label(), entry.outcome, entry.name);
    }
}

/// Forward non-empty lines from `reader` as scans until EOF
fn spawn_line_reader<R>(reader: R, source: ScanSource, scans: mpsc::Sender<RawScan>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let scan = RawScan { source, text: line };
                    if scans.send(scan).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(%source, "Scan source reached end of input");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%source, error = %e, "Scan source read failed");
                    break;
                }
            }
        }
    })
}

fn spawn_nfc_bridge(path: PathBuf, scans: mpsc::Sender<RawScan>) {
    tokio::spawn(async move {
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                tracing::info!(path = %path.display(), "NFC bridge attached");
                let _ = spawn_line_reader(file, ScanSource::Nfc, scans).await;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "NFC bridge unavailable, camera only");
            }
        }
    });
}

fn spawn_display(mut events: mpsc::Receiver<ScannerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ScannerEvent::Resolved(feedback) => {
                    println!("{feedback}");
                    tracing::debug!(sound = ?feedback.sound(), "Feedback cue");
                }
                ScannerEvent::Ready => {
                    tracing::debug!("Ready for next scan");
                }
            }
        }
    })
}

fn spawn_sync_logger(mut events: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Flushed {
                    inserted,
                    duplicates,
                }) => {
                    tracing::info!(inserted, duplicates, "Pending scans synced");
                }
                Ok(SyncEvent::Failed { error }) => {
                    tracing::warn!(%error, "Sync attempt failed");
                }
                Ok(SyncEvent::Skipped(reason)) => {
                    tracing::debug!(%reason, "Sync skipped");
                }
                Ok(SyncEvent::QueueCount(pending)) => {
                    println!("Pendientes de sincronizar: {pending}");
                }
                Ok(SyncEvent::WentOffline) => {
                    println!("Sin conexión: los registros se guardan localmente");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Sync log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
