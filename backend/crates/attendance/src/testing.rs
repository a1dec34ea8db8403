//! Test doubles shared by unit and scenario tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::application::clock::Clock;
use crate::domain::entities::{BatchAck, DirectoryEntry, PendingScan, ServerVerdict};
use crate::domain::repository::AttendanceApi;
use crate::domain::services::encode_credential;
use crate::domain::value_objects::{DirectoryStatus, LocalScanId, ScanOutcome, SigningKey, StudentId};
use crate::error::{AttendanceError, AttendanceResult};

pub const TEST_KEY: &[u8] = b"coach-session-key-0123456789abcd";

pub fn test_key() -> SigningKey {
    SigningKey::from_bytes(TEST_KEY.to_vec()).unwrap()
}

/// Credential text signed with [`TEST_KEY`]
pub fn signed(student_id: &str, valid_until: NaiveDate, name: &str) -> String {
    encode_credential(TEST_KEY, student_id, valid_until, name)
}

/// Local time in a fixed UTC-5 offset
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
}

pub fn directory_entry(status: DirectoryStatus, name: &str) -> DirectoryEntry {
    DirectoryEntry {
        status,
        display_name: name.to_string(),
        detail: None,
    }
}

pub fn verdict(outcome: ScanOutcome, name: &str) -> ServerVerdict {
    ServerVerdict {
        outcome,
        student_name: Some(name.to_string()),
        message: String::new(),
        detail: None,
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Default)]
struct FakeState {
    offline: bool,
    directory: HashMap<StudentId, DirectoryEntry>,
    verdicts: HashMap<String, ServerVerdict>,
    batch_ack: Option<BatchAck>,
    batch_status: Option<u16>,
    batch_delay: Option<Duration>,
    scan_delay: Option<Duration>,
    scan_status: Option<u16>,
    scan_calls: Vec<String>,
    batch_calls: Vec<Vec<LocalScanId>>,
    batch_tokens: Vec<String>,
}

/// Scriptable in-memory backend
#[derive(Debug, Default)]
pub struct FakeAttendanceApi {
    state: Mutex<FakeState>,
}

impl FakeAttendanceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every call fails as unreachable while set
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_directory<'a>(&self, entries: impl IntoIterator<Item = (&'a str, DirectoryEntry)>) {
        self.state.lock().unwrap().directory = entries
            .into_iter()
            .map(|(id, entry)| (StudentId::new(id), entry))
            .collect();
    }

    pub fn set_verdict(&self, code: &str, verdict: ServerVerdict) {
        self.state
            .lock()
            .unwrap()
            .verdicts
            .insert(code.to_string(), verdict);
    }

    /// Fixed acknowledgment; by default every record counts as inserted
    pub fn set_batch_ack(&self, ack: BatchAck) {
        self.state.lock().unwrap().batch_ack = Some(ack);
    }

    /// Answer batches with this HTTP status
    pub fn fail_batches_with(&self, status: Option<u16>) {
        self.state.lock().unwrap().batch_status = status;
    }

    pub fn set_batch_delay(&self, delay: Duration) {
        self.state.lock().unwrap().batch_delay = Some(delay);
    }

    /// Answer scans with this HTTP status
    pub fn fail_scans_with(&self, status: Option<u16>) {
        self.state.lock().unwrap().scan_status = status;
    }

    pub fn set_scan_delay(&self, delay: Duration) {
        self.state.lock().unwrap().scan_delay = Some(delay);
    }

    pub fn scan_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().scan_calls.clone()
    }

    pub fn batch_calls(&self) -> Vec<Vec<LocalScanId>> {
        self.state.lock().unwrap().batch_calls.clone()
    }

    pub fn batch_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().batch_tokens.clone()
    }

    fn check_online(&self) -> AttendanceResult<()> {
        if self.state.lock().unwrap().offline {
            return Err(AttendanceError::Network("connection refused".into()));
        }
        Ok(())
    }
}

impl AttendanceApi for FakeAttendanceApi {
    async fn submit_scan(&self, code: &str) -> AttendanceResult<ServerVerdict> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.scan_calls.push(code.to_string());
            state.scan_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;

        let state = self.state.lock().unwrap();
        if let Some(status) = state.scan_status {
            return Err(AttendanceError::Rejected {
                status,
                body: "Internal Server Error".into(),
            });
        }
        Ok(state.verdicts.get(code).cloned().unwrap_or(ServerVerdict {
            outcome: ScanOutcome::Error,
            student_name: None,
            message: "Credencial inválida".into(),
            detail: None,
        }))
    }

    async fn fetch_directory(&self) -> AttendanceResult<HashMap<StudentId, DirectoryEntry>> {
        self.check_online()?;
        Ok(self.state.lock().unwrap().directory.clone())
    }

    async fn sync_batch(&self, records: &[PendingScan], token: &str) -> AttendanceResult<BatchAck> {
        let delay = self.state.lock().unwrap().batch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;

        let mut state = self.state.lock().unwrap();
        state
            .batch_calls
            .push(records.iter().map(|r| r.local_id.clone()).collect());
        state.batch_tokens.push(token.to_string());

        if let Some(status) = state.batch_status {
            return Err(AttendanceError::Rejected {
                status,
                body: "Token inválido".into(),
            });
        }
        Ok(state.batch_ack.unwrap_or(BatchAck {
            inserted: records.len() as u32,
            duplicates: 0,
        }))
    }
}
