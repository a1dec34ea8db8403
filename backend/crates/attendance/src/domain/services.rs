//! Domain Services
//!
//! Credential codec: pure functions from scanned text to a verified
//! [`Credential`] or a typed rejection.
//!
//! Signed layout:
//! ```text
//! JRS:<studentId>:<YYYYMMDD>:<base64url(displayName)>:<hex(mac[..8])>
//! ```
//! The MAC is HMAC-SHA256 over `studentId|YYYYMMDD|displayName` with the
//! plaintext (decoded) name.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use platform::crypto::{constant_time_eq, from_base64url, from_hex, truncated_hmac_sha256};

use crate::domain::entities::{Credential, SignedFields};
use crate::domain::value_objects::{SigningKey, StudentId};
use crate::error::CredentialError;

/// Prefix that marks the signed layout
pub const SIGNED_PREFIX: &str = "JRS";

/// Bytes of the MAC kept in the credential
pub const SIGNATURE_LEN: usize = 8;

const QUERY_MARKER: &str = "?code=";

/// Strip a `...?code=XXX` URL wrapper, leaving the bare payload
pub fn extract_payload(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.find(QUERY_MARKER) {
        Some(pos) => {
            let rest = &raw[pos + QUERY_MARKER.len()..];
            rest.split('&').next().unwrap_or(rest).trim()
        }
        None => raw,
    }
}

/// Whether the payload claims the signed layout
pub fn has_signed_prefix(payload: &str) -> bool {
    payload
        .strip_prefix(SIGNED_PREFIX)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Split a signed payload into its four fields
///
/// Returns `None` when the prefix is absent or the layout is wrong; callers
/// tell the two apart with [`has_signed_prefix`].
pub fn parse_signed(payload: &str) -> Option<SignedFields> {
    let mut parts = payload.split(':');
    if parts.next()? != SIGNED_PREFIX {
        return None;
    }
    let fields: Vec<&str> = parts.collect();
    let [student_id, valid_date, name_encoded, signature_hex] = fields.as_slice() else {
        return None;
    };

    if fields.iter().any(|f| f.is_empty()) {
        return None;
    }
    if valid_date.len() != 8 || !valid_date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(SignedFields {
        student_id: (*student_id).to_string(),
        valid_date: (*valid_date).to_string(),
        name_encoded: (*name_encoded).to_string(),
        signature_hex: (*signature_hex).to_string(),
    })
}

/// Like [`parse_signed`], but explains why a prefixed payload did not parse
pub fn parse_signed_strict(payload: &str) -> Result<SignedFields, CredentialError> {
    parse_signed(payload).ok_or_else(|| {
        let count = payload.split(':').count().saturating_sub(1);
        if count != 4 {
            CredentialError::Format("expected four fields after prefix")
        } else {
            CredentialError::Format("empty field or date is not YYYYMMDD")
        }
    })
}

/// URL-safe base64, then UTF-8; fails closed
pub fn decode_name(encoded: &str) -> Result<String, CredentialError> {
    let bytes = from_base64url(encoded).map_err(|_| CredentialError::NameEncoding)?;
    String::from_utf8(bytes).map_err(|_| CredentialError::NameEncoding)
}

/// Bytes the MAC is computed over
pub fn canonical_message(student_id: &str, valid_date: &str, display_name: &str) -> String {
    format!("{}|{}|{}", student_id, valid_date, display_name)
}

/// Recompute the MAC with `key` and compare against the embedded one
pub fn verify(fields: &SignedFields, key: Option<&SigningKey>) -> Result<Credential, CredentialError> {
    let key = key.ok_or(CredentialError::NoSigningKey)?;
    let display_name = decode_name(&fields.name_encoded)?;

    let embedded = from_hex(&fields.signature_hex).map_err(|_| CredentialError::Signature)?;
    if embedded.len() != SIGNATURE_LEN {
        return Err(CredentialError::Signature);
    }

    let message = canonical_message(&fields.student_id, &fields.valid_date, &display_name);
    let expected = truncated_hmac_sha256(key.as_bytes(), message.as_bytes(), SIGNATURE_LEN)
        .map_err(|_| CredentialError::NoSigningKey)?;
    if !constant_time_eq(&expected, &embedded) {
        return Err(CredentialError::Signature);
    }

    // Signed over a date that does not exist; issuer bug, not tampering
    let valid_until = NaiveDate::parse_from_str(&fields.valid_date, "%Y%m%d")
        .map_err(|_| CredentialError::Format("date is not a calendar day"))?;

    Ok(Credential {
        student_id: StudentId::new(fields.student_id.clone()),
        valid_until,
        display_name,
        signature: embedded,
    })
}

/// Current through 23:59:59 of `valid_until`; expired strictly after
pub fn is_expired(valid_until: NaiveDate, now: NaiveDateTime) -> bool {
    let end_of_day = valid_until.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN));
    now > end_of_day
}

/// Produce a signed credential text; the issuer side, for tests and fixtures
#[cfg(test)]
pub(crate) fn encode_credential(
    key: &[u8],
    student_id: &str,
    valid_until: NaiveDate,
    display_name: &str,
) -> String {
    use platform::crypto::{to_base64url, to_hex};

    let date = valid_until.format("%Y%m%d").to_string();
    let mac = truncated_hmac_sha256(
        key,
        canonical_message(student_id, &date, display_name).as_bytes(),
        SIGNATURE_LEN,
    )
    .unwrap();
    format!(
        "{}:{}:{}:{}:{}",
        SIGNED_PREFIX,
        student_id,
        date,
        to_base64url(display_name.as_bytes()),
        to_hex(&mac)
    )
}
