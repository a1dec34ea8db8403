//! Secret Byte Buffers
//!
//! Key material that must not outlive its session in memory.
//!
//! ## Security
//! - Implements `Zeroize` and `ZeroizeOnDrop`
//! - Does not implement `Clone` to prevent accidental copies
//! - Debug output is redacted; [`SecretBytes::fingerprint`] gives a
//!   loggable, non-reversible identifier instead

use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{from_base64, sha256, to_hex};

/// Errors when importing secret material
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("secret is empty")]
    Empty,

    #[error("secret is not valid base64")]
    InvalidEncoding,
}

/// Raw secret bytes, wiped from memory on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SecretError> {
        if bytes.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(Self(bytes))
    }

    /// Import from standard base64 (the encoding the login response uses)
    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        let mut bytes = from_base64(encoded.trim()).map_err(|_| SecretError::InvalidEncoding)?;
        let secret = Self::new(std::mem::take(&mut bytes));
        bytes.zeroize();
        secret
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 4 bytes of SHA-256, hex encoded
    pub fn fingerprint(&self) -> String {
        to_hex(&sha256(&self.0)[..4])
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.0.len())
    }
}
