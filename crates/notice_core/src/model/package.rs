//! Package entity model.
//!
//! A package is versioned per process only: `(cp_id, package_date)` with no
//! secondary tables.

use crate::model::release::{require, ReleaseValidationError};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a release package for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntity {
    pub cp_id: String,
    /// Epoch milliseconds. Rows are clustered by this value descending.
    pub package_date: i64,
    /// Serialized OCDS package document.
    pub json_data: String,
}

impl PackageEntity {
    pub fn validate(&self) -> Result<(), ReleaseValidationError> {
        require("cp_id", &self.cp_id)?;
        require("json_data", &self.json_data)?;
        if self.package_date < 0 {
            return Err(ReleaseValidationError::NegativeTimestamp("package_date"));
        }
        Ok(())
    }
}
