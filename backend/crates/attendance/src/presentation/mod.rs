//! Presentation Layer
//!
//! Backend wire DTOs and operator-facing feedback.

pub mod dto;
pub mod feedback;
