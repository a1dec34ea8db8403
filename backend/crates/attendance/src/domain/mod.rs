//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (Credential, PendingScan, DirectorySnapshot)
//! - Domain value objects (ScanOutcome, DirectoryStatus, SigningKey)
//! - Domain services (credential codec)
//! - Repository traits (interfaces)

pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;
