//! Core use-case services.
//!
//! # Responsibility
//! - Turn OCDS documents into versioned entities and hand them to repositories.
//! - Keep callers decoupled from storage details.

pub mod compile;
pub mod package_service;
pub mod release_service;
