//! Backend wire DTOs (Data Transfer Objects)
//!
//! Shapes of the attendance backend's JSON, and their conversion into
//! domain values. The backend mixes English and Spanish field names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::entities::{BatchAck, DirectoryEntry, PendingScan, ServerVerdict};
use crate::domain::value_objects::{DirectoryStatus, ScanOutcome, StudentId};

/// Displayed when neither the response nor the message names the student
pub const UNKNOWN_NAME: &str = "Desconocido";

/// Request for POST /attendance/scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanRequest<'a> {
    pub code: &'a str,
}

/// Response for POST /attendance/scan
///
/// Error responses carry only `detail`, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanResponseDto {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "detalle")]
    pub detail: Option<String>,
}

impl ScanResponseDto {
    pub fn into_verdict(self) -> ServerVerdict {
        let outcome = self
            .status
            .as_deref()
            .map(ScanOutcome::from_code)
            .unwrap_or(ScanOutcome::Error);
        let message = self
            .message
            .clone()
            .or_else(|| self.detail.clone())
            .unwrap_or_default();
        let student_name = self
            .student_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| name_from_message(&message));

        ServerVerdict {
            outcome,
            student_name,
            message,
            detail: self.detail,
        }
    }
}

/// Recover the name from `¡Bienvenido, X!` or `Ya registrado: X`
pub fn name_from_message(message: &str) -> Option<String> {
    let rest = if let Some(pos) = message.find("Bienvenido") {
        let rest = &message[pos + "Bienvenido".len()..];
        let rest = rest.strip_prefix(',').unwrap_or(rest);
        // at least one space must separate the greeting from the name
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest
    } else if let Some(pos) = message.find("Ya registrado:") {
        &message[pos + "Ya registrado:".len()..]
    } else {
        return None;
    };

    let name = rest.split('!').next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// One entry of GET /attendance/scanner/offline-data
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineEntryDto {
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "detail")]
    pub detalle: Option<String>,
}

impl From<OfflineEntryDto> for DirectoryEntry {
    fn from(dto: OfflineEntryDto) -> Self {
        Self {
            status: DirectoryStatus::from_code(&dto.status),
            display_name: dto
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            detail: dto.detalle.filter(|d| !d.is_empty()),
        }
    }
}

/// Response for GET /attendance/scanner/offline-data
pub type OfflineDataDto = HashMap<String, OfflineEntryDto>;

pub fn directory_from_dto(dto: OfflineDataDto) -> HashMap<StudentId, DirectoryEntry> {
    dto.into_iter()
        .map(|(id, entry)| (StudentId::new(id), entry.into()))
        .collect()
}

/// One record of POST /attendance/sync-batch
#[derive(Debug, Clone, Serialize)]
pub struct SyncRecordDto<'a> {
    pub student_id: &'a str,
    pub timestamp: String,
    pub local_id: &'a str,
}

impl<'a> From<&'a PendingScan> for SyncRecordDto<'a> {
    fn from(scan: &'a PendingScan) -> Self {
        Self {
            student_id: scan.student_id.as_str(),
            timestamp: scan.timestamp.to_rfc3339(),
            local_id: scan.local_id.as_str(),
        }
    }
}

/// Request for POST /attendance/sync-batch
#[derive(Debug, Clone, Serialize)]
pub struct SyncBatchRequest<'a> {
    pub token: &'a str,
    pub records: Vec<SyncRecordDto<'a>>,
}

/// Response for POST /attendance/sync-batch; missing counts read as zero
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BatchAckDto {
    #[serde(default)]
    pub inserted: u32,
    #[serde(default)]
    pub duplicates: u32,
}

impl From<BatchAckDto> for BatchAck {
    fn from(dto: BatchAckDto) -> Self {
        Self {
            inserted: dto.inserted,
            duplicates: dto.duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_scan_response_success() {
        let dto: ScanResponseDto = serde_json::from_str(
            r#"{"status":"success","message":"¡Bienvenido, Ana!","student_name":"Ana"}"#,
        )
        .unwrap();
        let verdict = dto.into_verdict();
        assert_eq!(verdict.outcome, ScanOutcome::Success);
        assert_eq!(verdict.student_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_scan_response_name_fallback_from_message() {
        let dto: ScanResponseDto =
            serde_json::from_str(r#"{"status":"warning","message":"Ya registrado: Luis Gómez"}"#)
                .unwrap();
        assert_eq!(dto.into_verdict().student_name.as_deref(), Some("Luis Gómez"));
    }

    #[test]
    fn test_scan_response_detalle_alias_and_unknown_status() {
        let dto: ScanResponseDto =
            serde_json::from_str(r#"{"status":"mystery","detalle":"Pago pendiente"}"#).unwrap();
        let verdict = dto.into_verdict();
        assert_eq!(verdict.outcome, ScanOutcome::Error);
        assert_eq!(verdict.detail.as_deref(), Some("Pago pendiente"));
        assert_eq!(verdict.message, "Pago pendiente");
        assert!(verdict.student_name.is_none());
    }

    #[test]
    fn test_error_body_is_error_verdict() {
        let dto: ScanResponseDto = serde_json::from_str(r#"{"detail":"Credencial inválida"}"#).unwrap();
        let verdict = dto.into_verdict();
        assert_eq!(verdict.outcome, ScanOutcome::Error);
        assert_eq!(verdict.message, "Credencial inválida");
    }

    #[test]
    fn test_name_from_message() {
        assert_eq!(name_from_message("¡Bienvenido, Ana María!").as_deref(), Some("Ana María"));
        assert_eq!(name_from_message("Bienvenido Pedro").as_deref(), Some("Pedro"));
        assert_eq!(name_from_message("Ya registrado:Sol").as_deref(), Some("Sol"));
        assert_eq!(name_from_message("¡Bienvenido!"), None);
        assert_eq!(name_from_message("Credencial inválida"), None);
    }

    #[test]
    fn test_offline_data_conversion() {
        let dto: OfflineDataDto = serde_json::from_str(
            r#"{
                "s1": {"status": "ok", "name": "Ana", "detalle": ""},
                "s2": {"status": "debe", "name": "Luis", "detalle": "Vence 01/03"},
                "s3": {"status": "blocked"}
            }"#,
        )
        .unwrap();
        let directory = directory_from_dto(dto);

        let s1 = &directory[&StudentId::new("s1")];
        assert_eq!(s1.status, DirectoryStatus::Ok);
        assert!(s1.detail.is_none());

        assert_eq!(directory[&StudentId::new("s2")].detail.as_deref(), Some("Vence 01/03"));

        let s3 = &directory[&StudentId::new("s3")];
        assert_eq!(s3.status, DirectoryStatus::Debe);
        assert_eq!(s3.display_name, UNKNOWN_NAME);
    }

    #[test]
    fn test_sync_batch_request_shape() {
        let ts = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 9, 0, 0)
            .unwrap();
        let scan = PendingScan::new(StudentId::new("s1"), ts);
        let request = SyncBatchRequest {
            token: "tok",
            records: vec![SyncRecordDto::from(&scan)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["token"], "tok");
        assert_eq!(json["records"][0]["student_id"], "s1");
        assert_eq!(json["records"][0]["local_id"], scan.local_id.as_str());
        assert_eq!(json["records"][0]["timestamp"], "2025-03-14T09:00:00+00:00");
        assert!(json["records"][0].get("synced").is_none());
    }

    #[test]
    fn test_batch_ack_defaults_to_zero() {
        let ack: BatchAckDto = serde_json::from_str(r#"{"inserted": 2}"#).unwrap();
        assert_eq!(BatchAck::from(ack), BatchAck { inserted: 2, duplicates: 0 });
    }
}
