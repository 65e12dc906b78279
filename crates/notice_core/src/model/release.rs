//! Release entity model.
//!
//! # Responsibility
//! - Define one immutable release event and its storage key.
//! - Validate required key fields before any storage call.
//!
//! # Invariants
//! - `(cp_id, oc_id, release_date, release_id)` addresses exactly one row.
//! - `json_data` is opaque serialized OCDS text.
//! - A master-schedule release uses `oc_id == cp_id` and may leave `stage`
//!   blank; every other release needs a stage.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Full storage key of a release row in history and compiled tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseKey {
    pub cp_id: String,
    pub oc_id: String,
    /// Epoch milliseconds. Rows are clustered by this value descending.
    pub release_date: i64,
    pub release_id: String,
}

/// One immutable release event for a procurement process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntity {
    /// Procurement process id (partition key).
    pub cp_id: String,
    /// Contracting operation id within the process.
    pub oc_id: String,
    /// Globally unique release token.
    pub release_id: String,
    /// Stage label such as `ei`, `pn` or `ev`.
    pub stage: String,
    /// Epoch milliseconds at which this release was produced.
    pub release_date: i64,
    /// Epoch milliseconds of the first publication of the operation.
    pub publish_date: i64,
    /// Tender status copied from the document, when it has one.
    pub status: Option<String>,
    /// Serialized OCDS release document.
    pub json_data: String,
}

/// Validation error for malformed release or package input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseValidationError {
    /// A required key or payload field is empty or blank.
    MissingField(&'static str),
    /// A timestamp field is before the Unix epoch.
    NegativeTimestamp(&'static str),
    /// The payload is not a JSON object.
    InvalidPayload(String),
}

impl Display for ReleaseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required field `{field}` is missing"),
            Self::NegativeTimestamp(field) => {
                write!(f, "timestamp field `{field}` must not be negative")
            }
            Self::InvalidPayload(message) => write!(f, "invalid json payload: {message}"),
        }
    }
}

impl Error for ReleaseValidationError {}

impl ReleaseEntity {
    /// Returns the full storage key of this release.
    pub fn key(&self) -> ReleaseKey {
        ReleaseKey {
            cp_id: self.cp_id.clone(),
            oc_id: self.oc_id.clone(),
            release_date: self.release_date,
            release_id: self.release_id.clone(),
        }
    }

    /// True for the process-level master-schedule release.
    pub fn is_master_schedule(&self) -> bool {
        self.oc_id == self.cp_id
    }

    /// Checks required fields.
    ///
    /// The payload is not schema-checked; only presence is enforced.
    pub fn validate(&self) -> Result<(), ReleaseValidationError> {
        require("cp_id", &self.cp_id)?;
        require("oc_id", &self.oc_id)?;
        require("release_id", &self.release_id)?;
        if !self.is_master_schedule() {
            require("stage", &self.stage)?;
        }
        require("json_data", &self.json_data)?;
        if self.release_date < 0 {
            return Err(ReleaseValidationError::NegativeTimestamp("release_date"));
        }
        if self.publish_date < 0 {
            return Err(ReleaseValidationError::NegativeTimestamp("publish_date"));
        }
        Ok(())
    }
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ReleaseValidationError> {
    if value.trim().is_empty() {
        return Err(ReleaseValidationError::MissingField(field));
    }
    Ok(())
}

/// Change-feed entry recording that a process received a release at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub cp_id: String,
    pub release_date: i64,
}
