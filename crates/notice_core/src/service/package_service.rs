//! Package use-case service.
//!
//! # Invariants
//! - Only JSON objects are accepted as package documents.
//! - A new package for a process is always dated after the previous one, so
//!   two publications in the same millisecond never overwrite each other.

use crate::model::ids::next_epoch_ms;
use crate::model::package::PackageEntity;
use crate::model::release::ReleaseValidationError;
use crate::repo::package_repo::PackageRepository;
use crate::repo::release_repo::RepoError;
use log::{error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for package use-cases.
#[derive(Debug)]
pub enum PackageServiceError {
    InvalidDocument(serde_json::Error),
    /// The newest stored package is dated `i64::MAX`; nothing can follow it.
    DateOverflow { cp_id: String },
    Repo(RepoError),
}

impl Display for PackageServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDocument(err) => write!(f, "invalid package document: {err}"),
            Self::DateOverflow { cp_id } => {
                write!(f, "latest package of `{cp_id}` cannot be followed by a later one")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PackageServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDocument(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::DateOverflow { .. } => None,
        }
    }
}

impl From<RepoError> for PackageServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Use-case service wrapper for package publishing.
pub struct PackageService<R: PackageRepository> {
    repo: R,
}

impl<R: PackageRepository> PackageService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Stores `document` as the newest package of `cp_id`.
    pub fn publish_package(
        &self,
        cp_id: &str,
        document: &Value,
    ) -> Result<PackageEntity, PackageServiceError> {
        if cp_id.trim().is_empty() {
            return Err(
                RepoError::MalformedInput(ReleaseValidationError::MissingField("cp_id")).into(),
            );
        }
        if !document.is_object() {
            return Err(RepoError::MalformedInput(ReleaseValidationError::InvalidPayload(
                "package document must be a JSON object".to_string(),
            ))
            .into());
        }

        let previous_date = self
            .repo
            .get_latest_package(cp_id)?
            .map(|package| package.package_date);
        let package_date =
            next_epoch_ms(previous_date).ok_or_else(|| PackageServiceError::DateOverflow {
                cp_id: cp_id.to_string(),
            })?;

        let package = PackageEntity {
            cp_id: cp_id.to_string(),
            package_date,
            json_data: serde_json::to_string(document)
                .map_err(PackageServiceError::InvalidDocument)?,
        };

        match self.repo.save_package(&package) {
            Ok(()) => {
                info!(
                    "event=package_save module=service status=ok cp_id={} package_date={}",
                    package.cp_id, package.package_date
                );
                Ok(package)
            }
            Err(err) => {
                error!(
                    "event=package_save module=service status=error cp_id={} error={}",
                    package.cp_id, err
                );
                Err(err.into())
            }
        }
    }

    /// Parses the newest package of `cp_id`.
    pub fn latest_package(&self, cp_id: &str) -> Result<Option<Value>, PackageServiceError> {
        match self.repo.get_latest_package(cp_id)? {
            Some(package) => serde_json::from_str(&package.json_data)
                .map(Some)
                .map_err(PackageServiceError::InvalidDocument),
            None => Ok(None),
        }
    }
}
