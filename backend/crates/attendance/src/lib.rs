//! Attendance Scanner Module
//!
//! Clean Architecture structure:
//! - `domain/` - Credential codec, entities, repository traits
//! - `application/` - Key store, queue, directory cache, sync engine, orchestrator
//! - `infra/` - reqwest backend, JSON-file and in-memory stores
//! - `presentation/` - Backend DTOs and operator feedback
//!
//! ## Offline Model
//! - Signed credentials are verified locally with the coach's session key;
//!   no round-trip is needed to accept or reject one
//! - Accepted scans that cannot be submitted are queued durably under an
//!   idempotency key and replayed to the backend in batches
//! - Queue records are marked synced only on explicit acknowledgment

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{HistoryMode, ScannerConfig, SyncSchedule};
pub use application::connectivity::Connectivity;
pub use application::directory_cache::DirectoryCache;
pub use application::key_store::{CoachSession, SigningKeyStore};
pub use application::orchestrator::{RawScan, ScanOrchestrator, ScannerEvent, ScannerState};
pub use application::pending_queue::PendingScanQueue;
pub use application::sync_engine::{FlushOutcome, SyncEngine, SyncEvent, SyncReport, SyncSkip};
pub use domain::value_objects::{ScanOutcome, ScanSource, SigningKey};
pub use error::{AttendanceError, AttendanceResult, CredentialError};
pub use infra::file_store::{JsonDirectoryRepository, JsonPendingScanRepository};
pub use infra::http_api::HttpAttendanceApi;
pub use presentation::feedback::{Resolution, ScanFeedback, SoundCue};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult, ResultExt},
    kind::ErrorKind,
};

pub mod codec {
    //! Credential codec plus the platform encoders it is built on
    pub use crate::domain::services::*;
    pub use platform::crypto::{from_base64url, from_hex, to_base64url, to_hex};
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
