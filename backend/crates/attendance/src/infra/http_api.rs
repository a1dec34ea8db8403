//! HTTP Attendance Backend
//!
//! reqwest implementation of [`AttendanceApi`]. One pooled client, every
//! request bounded by the configured timeout.

use std::collections::HashMap;

use platform::http::{HttpClientConfig, build_client, join_url};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::application::config::ScannerConfig;
use crate::domain::entities::{BatchAck, DirectoryEntry, PendingScan, ServerVerdict};
use crate::domain::repository::AttendanceApi;
use crate::domain::value_objects::StudentId;
use crate::error::{AttendanceError, AttendanceResult};
use crate::presentation::dto::{
    BatchAckDto, OfflineDataDto, ScanRequest, ScanResponseDto, SyncBatchRequest, SyncRecordDto,
    directory_from_dto,
};
use kernel::error::kind::ErrorKind;

const SCAN_PATH: &str = "/attendance/scan";
const OFFLINE_DATA_PATH: &str = "/attendance/scanner/offline-data";
const SYNC_BATCH_PATH: &str = "/attendance/sync-batch";

/// Upper bound on error bodies kept for logs
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpAttendanceApi {
    base_url: String,
    client: Client,
}

impl HttpAttendanceApi {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> AttendanceResult<Self> {
        let client = build_client(config).map_err(|e| AttendanceError::Internal(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Client bounded by the scanner's request timeout
    pub fn from_config(config: &ScannerConfig) -> AttendanceResult<Self> {
        Self::new(
            config.api_url.clone(),
            &HttpClientConfig::with_timeout(config.request_timeout),
        )
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl AttendanceApi for HttpAttendanceApi {
    async fn submit_scan(&self, code: &str) -> AttendanceResult<ServerVerdict> {
        let response = self
            .client
            .post(self.url(SCAN_PATH))
            .json(&ScanRequest { code })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(read_json::<ScanResponseDto>(response).await?.into_verdict());
        }

        let body = read_body(response).await;
        let kind = ErrorKind::from_status_code(status.as_u16());
        if kind.is_client_error() && !kind.is_retryable() {
            // The backend looked at the code and said no
            let dto: ScanResponseDto = serde_json::from_str(&body).unwrap_or_default();
            return Ok(dto.into_verdict());
        }

        Err(AttendanceError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_directory(&self) -> AttendanceResult<HashMap<StudentId, DirectoryEntry>> {
        let response = self.client.get(self.url(OFFLINE_DATA_PATH)).send().await?;
        let response = ensure_success(response).await?;
        let dto: OfflineDataDto = read_json(response).await?;
        Ok(directory_from_dto(dto))
    }

    async fn sync_batch(&self, records: &[PendingScan], token: &str) -> AttendanceResult<BatchAck> {
        let request = SyncBatchRequest {
            token,
            records: records.iter().map(SyncRecordDto::from).collect(),
        };
        let response = self
            .client
            .post(self.url(SYNC_BATCH_PATH))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let ack: BatchAckDto = read_json(response).await?;
        Ok(ack.into())
    }
}

async fn ensure_success(response: Response) -> AttendanceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(AttendanceError::Rejected {
        status: status.as_u16(),
        body: read_body(response).await,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> AttendanceResult<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_body(response: Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
