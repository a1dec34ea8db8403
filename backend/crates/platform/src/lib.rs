//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (HMAC-SHA256, hex, Base64 / Base64url)
//! - Secret byte buffers that zeroize on drop
//! - Durable JSON file storage with atomic replace
//! - HTTP client construction with bounded timeouts

pub mod crypto;
pub mod http;
pub mod secret;
pub mod storage;
