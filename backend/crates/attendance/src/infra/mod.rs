//! Infrastructure Layer
//!
//! Implementations of the repository traits: the reqwest backend client and
//! the JSON-file and in-memory stores.

pub mod file_store;
pub mod http_api;
pub mod memory;
