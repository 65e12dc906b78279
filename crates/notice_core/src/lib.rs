//! Core persistence logic for the OCDS notice publisher.
//! This crate owns the versioned release/package storage invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, NoticeConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::budget::BudgetEntity;
pub use model::ids::{new_ocid, new_release_id, next_epoch_ms, now_epoch_ms};
pub use model::ocds::{RecordDocument, RecordTender};
pub use model::package::PackageEntity;
pub use model::release::{OffsetEntry, ReleaseEntity, ReleaseKey, ReleaseValidationError};
pub use repo::budget_repo::{BudgetRepository, SqliteBudgetRepository};
pub use repo::package_repo::{PackageRepository, SqlitePackageRepository};
pub use repo::release_repo::{
    HistoryQuery, OffsetQuery, ReleaseRepository, RepoError, RepoResult, SqliteReleaseRepository,
};
pub use service::compile::{CompileError, PassThroughCompiler, ReleaseCompiler};
pub use service::package_service::{PackageService, PackageServiceError};
pub use service::release_service::{ReleaseService, ReleaseServiceError, ReleaseServiceResult};

/// Minimal health-check API for smoke probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
