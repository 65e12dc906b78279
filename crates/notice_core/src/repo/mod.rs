//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for notice storage.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate entities before any storage call.
//! - Repository APIs return semantic errors (`MalformedInput`, `InvalidData`)
//!   in addition to storage transport errors.

pub mod budget_repo;
pub mod package_repo;
pub mod release_repo;
mod schema;
