//! Budget release model (expenditure items and funding sources).
//!
//! # Invariants
//! - Shares the release key and validation rules.
//! - `amount` is carried only on the compiled row.

use crate::model::release::{ReleaseEntity, ReleaseValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEntity {
    pub release: ReleaseEntity,
    /// Planned budget amount, absent for expenditure items without one.
    pub amount: Option<Decimal>,
}

impl BudgetEntity {
    pub fn validate(&self) -> Result<(), ReleaseValidationError> {
        self.release.validate()
    }
}
