//! Signing-Key Store
//!
//! Holds the coach session: the bearer token for batch sync and the key
//! that verifies credentials offline. Memory only; `clear` on logout drops
//! the session and the key bytes are zeroized once the last reader lets go.

use std::fmt;
use std::sync::{Arc, RwLock};

use platform::secret::SecretError;

use crate::domain::value_objects::SigningKey;

/// What a coach login provisions
pub struct CoachSession {
    token: String,
    signing_key: Option<SigningKey>,
}

impl CoachSession {
    pub fn new(token: impl Into<String>, signing_key: Option<SigningKey>) -> Self {
        Self {
            token: token.into(),
            signing_key,
        }
    }

    /// Build from the login response fields; the key arrives as base64
    pub fn from_login(token: impl Into<String>, signing_key_b64: Option<&str>) -> Result<Self, SecretError> {
        let signing_key = signing_key_b64.map(SigningKey::from_base64).transpose()?;
        Ok(Self::new(token, signing_key))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }
}

impl fmt::Debug for CoachSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoachSession")
            .field("token", &"[REDACTED]")
            .field("signing_key", &self.signing_key)
            .finish()
    }
}

/// Session-scoped holder of the active [`CoachSession`]
#[derive(Debug, Default)]
pub struct SigningKeyStore {
    session: RwLock<Option<Arc<CoachSession>>>,
}

impl SigningKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, replacing any previous one
    pub fn provision(&self, session: CoachSession) {
        let fingerprint = session.signing_key().map(|k| k.fingerprint());
        *self.write() = Some(Arc::new(session));
        tracing::info!(
            key_fingerprint = fingerprint.as_deref().unwrap_or("none"),
            "Coach session provisioned"
        );
    }

    /// Drop the session (logout)
    pub fn clear(&self) {
        if self.write().take().is_some() {
            tracing::info!("Coach session cleared");
        }
    }

    pub fn current(&self) -> Option<Arc<CoachSession>> {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token().to_string())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<CoachSession>>> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<CoachSession>>> {
        self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
