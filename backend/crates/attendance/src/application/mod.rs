//! Application Layer - Stateful services and use cases
//!
//! - Signing-key store, pending-scan queue, directory cache
//! - Sync engine and its scheduler
//! - Scan orchestrator state machine

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod directory_cache;
pub mod history;
pub mod key_store;
pub mod orchestrator;
pub mod pending_queue;
pub mod sync_engine;
