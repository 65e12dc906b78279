//! Release use-case service.
//!
//! # Responsibility
//! - Build release entities from OCDS record documents.
//! - Delegate compiled-state computation to a [`ReleaseCompiler`].
//! - Run the load-modify-append flow for record updates.
//! - Store the master-schedule (MS) release of a process under `oc_id = cp_id`.
//!
//! # Invariants
//! - Input is validated before any repository read or write.
//! - An updated record is appended as a new release whose `release_date` is
//!   strictly greater than the one it was derived from.
//! - The publish date of an operation never changes across its releases.

use crate::model::ids::{new_release_id, next_epoch_ms, now_epoch_ms};
use crate::model::ocds::RecordDocument;
use crate::model::release::{OffsetEntry, ReleaseEntity, ReleaseKey, ReleaseValidationError};
use crate::repo::release_repo::{
    HistoryQuery, OffsetQuery, ReleaseRepository, RepoError, RepoResult,
};
use crate::service::compile::{CompileError, PassThroughCompiler, ReleaseCompiler};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Service error for release use-cases.
#[derive(Debug)]
pub enum ReleaseServiceError {
    /// Stored or supplied document is not a valid OCDS release envelope.
    InvalidDocument(serde_json::Error),
    /// No compiled record exists for the requested operation.
    RecordNotFound { cp_id: String, oc_id: String },
    /// No master-schedule release exists for the process.
    MsNotFound { cp_id: String },
    /// The latest release is dated `i64::MAX`; no later release can follow.
    DateOverflow { cp_id: String, oc_id: String },
    /// The compiled-state collaborator failed.
    Compile(CompileError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ReleaseServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDocument(err) => write!(f, "invalid release document: {err}"),
            Self::RecordNotFound { cp_id, oc_id } => {
                write!(f, "record not found: {cp_id}/{oc_id}")
            }
            Self::MsNotFound { cp_id } => write!(f, "master schedule not found: {cp_id}"),
            Self::DateOverflow { cp_id, oc_id } => write!(
                f,
                "latest release of {cp_id}/{oc_id} cannot be followed by a later one"
            ),
            Self::Compile(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReleaseServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDocument(err) => Some(err),
            Self::Compile(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::RecordNotFound { .. } | Self::MsNotFound { .. } | Self::DateOverflow { .. } => {
                None
            }
        }
    }
}

impl From<RepoError> for ReleaseServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ReleaseValidationError> for ReleaseServiceError {
    fn from(value: ReleaseValidationError) -> Self {
        Self::Repo(RepoError::MalformedInput(value))
    }
}

impl From<CompileError> for ReleaseServiceError {
    fn from(value: CompileError) -> Self {
        Self::Compile(value)
    }
}

pub type ReleaseServiceResult<T> = Result<T, ReleaseServiceError>;

/// Use-case service wrapper for release publishing.
pub struct ReleaseService<R: ReleaseRepository, C: ReleaseCompiler = PassThroughCompiler> {
    repo: R,
    compiler: C,
}

impl<R: ReleaseRepository> ReleaseService<R, PassThroughCompiler> {
    /// Creates a service whose compiled rows copy the release payload.
    pub fn new(repo: R) -> Self {
        Self::with_compiler(repo, PassThroughCompiler)
    }
}

impl<R: ReleaseRepository, C: ReleaseCompiler> ReleaseService<R, C> {
    /// Creates a service using an explicit compiled-state collaborator.
    pub fn with_compiler(repo: R, compiler: C) -> Self {
        Self { repo, compiler }
    }

    /// Persists a fully caller-formed release.
    ///
    /// # Contract
    /// - Fails with `MalformedInput` before touching storage when key fields
    ///   are blank.
    /// - Writes history, compiled and offset rows in one atomic batch.
    /// - Performs no retry; the caller may resend the same release safely.
    pub fn publish_release(&mut self, release: &ReleaseEntity) -> ReleaseServiceResult<ReleaseKey> {
        let started_at = Instant::now();
        let result = self.write_release(release);
        match &result {
            Ok(()) => info!(
                "event=release_save module=service status=ok cp_id={} oc_id={} release_id={} stage={} duration_ms={}",
                release.cp_id,
                release.oc_id,
                release.release_id,
                release.stage,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=release_save module=service status=error cp_id={} oc_id={} release_id={} duration_ms={} error_code={} error={}",
                release.cp_id,
                release.oc_id,
                release.release_id,
                started_at.elapsed().as_millis(),
                error_code(err),
                err
            ),
        }
        result.map(|()| release.key())
    }

    /// Builds a release from an OCDS record document and persists it.
    ///
    /// # Contract
    /// - `document.ocid` and `document.id` are required.
    /// - `release_date` is the current time; `status` is the tender status.
    /// - Empty tender `items`/`lots`/`documents` are dropped before storing.
    pub fn save_record(
        &mut self,
        cp_id: &str,
        stage: &str,
        document: &RecordDocument,
        publish_date: i64,
    ) -> ReleaseServiceResult<ReleaseKey> {
        let oc_id = non_blank(document.ocid.as_deref(), "ocid")?;
        let release = build_release(
            cp_id,
            &oc_id,
            stage,
            document,
            now_epoch_ms(),
            publish_date,
        )?;
        self.publish_release(&release)
    }

    /// Stores the master-schedule release of `cp_id`.
    ///
    /// # Contract
    /// - The row is keyed `(cp_id, cp_id)` with a blank stage.
    /// - `document.id` is required; `document.ocid` is not consulted.
    pub fn save_ms(
        &mut self,
        cp_id: &str,
        document: &RecordDocument,
        publish_date: i64,
    ) -> ReleaseServiceResult<ReleaseKey> {
        let release = build_release(cp_id, cp_id, "", document, now_epoch_ms(), publish_date)?;
        self.publish_release(&release)
    }

    /// Loads the latest compiled master-schedule row of `cp_id`.
    pub fn get_ms_entity(&self, cp_id: &str) -> ReleaseServiceResult<ReleaseEntity> {
        self.repo
            .get_compiled(cp_id, cp_id)?
            .ok_or_else(|| ReleaseServiceError::MsNotFound {
                cp_id: cp_id.to_string(),
            })
    }

    /// Loads and parses the latest compiled record of one operation.
    pub fn get_record(&self, cp_id: &str, oc_id: &str) -> ReleaseServiceResult<RecordDocument> {
        let entity = self.get_record_entity(cp_id, oc_id)?;
        RecordDocument::from_json(&entity.json_data).map_err(ReleaseServiceError::InvalidDocument)
    }

    /// Loads the latest compiled row of one operation.
    pub fn get_record_entity(
        &self,
        cp_id: &str,
        oc_id: &str,
    ) -> ReleaseServiceResult<ReleaseEntity> {
        self.repo
            .get_compiled(cp_id, oc_id)?
            .ok_or_else(|| ReleaseServiceError::RecordNotFound {
                cp_id: cp_id.to_string(),
                oc_id: oc_id.to_string(),
            })
    }

    /// Appends a new release derived from the latest compiled record.
    ///
    /// # Contract
    /// - The new release gets a fresh release id and keeps stage and publish
    ///   date of the record it was derived from.
    /// - `mutate` sees the document after the new id is assigned.
    pub fn update_record(
        &mut self,
        cp_id: &str,
        oc_id: &str,
        mutate: impl FnOnce(&mut RecordDocument),
    ) -> ReleaseServiceResult<ReleaseKey> {
        let latest = self.get_record_entity(cp_id, oc_id)?;
        let mut document = RecordDocument::from_json(&latest.json_data)
            .map_err(ReleaseServiceError::InvalidDocument)?;

        document.ocid = Some(oc_id.to_string());
        document.id = Some(new_release_id(oc_id));
        mutate(&mut document);

        let release_date = next_epoch_ms(Some(latest.release_date)).ok_or_else(|| {
            ReleaseServiceError::DateOverflow {
                cp_id: cp_id.to_string(),
                oc_id: oc_id.to_string(),
            }
        })?;
        let release = build_release(
            cp_id,
            oc_id,
            &latest.stage,
            &document,
            release_date,
            latest.publish_date,
        )?;
        self.publish_release(&release)
    }

    /// Lists history rows of one operation, newest first.
    pub fn history(
        &self,
        cp_id: &str,
        oc_id: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<ReleaseEntity>> {
        self.repo.list_history(cp_id, oc_id, query)
    }

    /// Lists change-feed entries in chronological order.
    pub fn offsets(&self, query: &OffsetQuery) -> RepoResult<Vec<OffsetEntry>> {
        self.repo.list_offsets(query)
    }

    fn write_release(&mut self, release: &ReleaseEntity) -> ReleaseServiceResult<()> {
        release.validate()?;
        let previous = self.repo.get_compiled(&release.cp_id, &release.oc_id)?;
        let compiled = self.compiler.compile(previous.as_ref(), release)?;
        self.repo.save_release_with_compiled(release, &compiled)?;
        Ok(())
    }
}

fn build_release(
    cp_id: &str,
    oc_id: &str,
    stage: &str,
    document: &RecordDocument,
    release_date: i64,
    publish_date: i64,
) -> ReleaseServiceResult<ReleaseEntity> {
    let release_id = non_blank(document.id.as_deref(), "id")?;

    let mut normalized = document.clone();
    normalized.normalize();
    let json_data = normalized
        .to_json()
        .map_err(ReleaseServiceError::InvalidDocument)?;

    Ok(ReleaseEntity {
        cp_id: cp_id.to_string(),
        oc_id: oc_id.to_string(),
        release_id,
        stage: stage.to_string(),
        release_date,
        publish_date,
        status: normalized.tender_status().map(str::to_string),
        json_data,
    })
}

fn non_blank(value: Option<&str>, field: &'static str) -> Result<String, ReleaseValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(ReleaseValidationError::MissingField(field)),
    }
}

fn error_code(err: &ReleaseServiceError) -> &'static str {
    match err {
        ReleaseServiceError::Repo(RepoError::MalformedInput(_)) => "malformed_input",
        ReleaseServiceError::Repo(RepoError::StorageUnavailable(_)) => "storage_unavailable",
        ReleaseServiceError::Repo(_) => "repo_failed",
        ReleaseServiceError::InvalidDocument(_) => "invalid_document",
        ReleaseServiceError::RecordNotFound { .. } => "record_not_found",
        ReleaseServiceError::MsNotFound { .. } => "ms_not_found",
        ReleaseServiceError::DateOverflow { .. } => "date_overflow",
        ReleaseServiceError::Compile(_) => "compile_failed",
    }
}
