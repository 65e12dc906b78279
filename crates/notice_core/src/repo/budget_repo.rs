//! Budget release repository (expenditure items and funding sources).
//!
//! # Responsibility
//! - Persist budget releases with the same three-row batch as notices.
//! - Keep the decimal `amount` on the compiled row and sum it per process.
//!
//! # Invariants
//! - Amounts are stored as canonical decimal text, never as floating point.
//! - `total_amount` sums the latest compiled row of each operation only.

use crate::model::budget::BudgetEntity;
use crate::model::release::ReleaseEntity;
use crate::repo::release_repo::{
    column, ensure_schema_version, insert_offset_row, insert_release_row, parse_release_row,
    release_columns_sql, RepoError, RepoResult, OFFSET_COLUMNS, RELEASE_COLUMNS,
};
use crate::repo::schema::{ensure_columns, ensure_tables};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::str::FromStr;

const BUDGET_TABLE: &str = "notice_budget_release";
const BUDGET_COMPILED_TABLE: &str = "notice_budget_compiled_release";
const BUDGET_OFFSET_TABLE: &str = "notice_budget_offset";

/// Repository interface for budget releases.
pub trait BudgetRepository {
    fn save_budget(&mut self, budget: &BudgetEntity) -> RepoResult<()>;
    /// Latest compiled budget of the process.
    fn get_budget(&self, cp_id: &str) -> RepoResult<Option<BudgetEntity>>;
    /// Latest compiled budget of one operation (e.g. one funding source).
    fn get_budget_by_oc(&self, cp_id: &str, oc_id: &str) -> RepoResult<Option<BudgetEntity>>;
    /// Sum of the latest amount of every operation in the process.
    ///
    /// Returns `None` when no operation carries an amount.
    fn total_amount(&self, cp_id: &str) -> RepoResult<Option<Decimal>>;
}

/// SQLite-backed budget repository.
pub struct SqliteBudgetRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteBudgetRepository<'conn> {
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[BUDGET_TABLE, BUDGET_COMPILED_TABLE, BUDGET_OFFSET_TABLE],
        )?;
        ensure_columns(conn, BUDGET_TABLE, RELEASE_COLUMNS)?;
        ensure_columns(conn, BUDGET_COMPILED_TABLE, RELEASE_COLUMNS)?;
        ensure_columns(conn, BUDGET_COMPILED_TABLE, &["amount"])?;
        ensure_columns(conn, BUDGET_OFFSET_TABLE, OFFSET_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl BudgetRepository for SqliteBudgetRepository<'_> {
    fn save_budget(&mut self, budget: &BudgetEntity) -> RepoResult<()> {
        budget.validate()?;
        let release = &budget.release;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_release_row(&tx, BUDGET_TABLE, release, release.json_data.as_str())?;
        tx.execute(
            "INSERT OR REPLACE INTO notice_budget_compiled_release (
                cp_id,
                oc_id,
                release_date,
                release_id,
                stage,
                publish_date,
                status,
                amount,
                json_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                release.cp_id.as_str(),
                release.oc_id.as_str(),
                release.release_date,
                release.release_id.as_str(),
                release.stage.as_str(),
                release.publish_date,
                release.status.as_deref(),
                budget.amount.map(|amount| amount.normalize().to_string()),
                release.json_data.as_str(),
            ],
        )?;
        insert_offset_row(&tx, BUDGET_OFFSET_TABLE, &release.cp_id, release.release_date)?;
        tx.commit()?;
        Ok(())
    }

    fn get_budget(&self, cp_id: &str) -> RepoResult<Option<BudgetEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, amount FROM {BUDGET_COMPILED_TABLE}
             WHERE cp_id = ?1
             ORDER BY release_date DESC, oc_id ASC, release_id ASC
             LIMIT 1;",
            release_columns_sql()
        ))?;
        let mut rows = stmt.query([cp_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_budget_row(row)?));
        }
        Ok(None)
    }

    fn get_budget_by_oc(&self, cp_id: &str, oc_id: &str) -> RepoResult<Option<BudgetEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, amount FROM {BUDGET_COMPILED_TABLE}
             WHERE cp_id = ?1 AND oc_id = ?2
             ORDER BY release_date DESC, release_id ASC
             LIMIT 1;",
            release_columns_sql()
        ))?;
        let mut rows = stmt.query([cp_id, oc_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_budget_row(row)?));
        }
        Ok(None)
    }

    fn total_amount(&self, cp_id: &str) -> RepoResult<Option<Decimal>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.amount
             FROM notice_budget_compiled_release c
             WHERE c.cp_id = ?1
               AND c.amount IS NOT NULL
               AND c.release_date = (
                   SELECT MAX(latest.release_date)
                   FROM notice_budget_compiled_release latest
                   WHERE latest.cp_id = c.cp_id AND latest.oc_id = c.oc_id
               );",
        )?;
        let mut rows = stmt.query([cp_id])?;
        let mut total: Option<Decimal> = None;
        while let Some(row) = rows.next()? {
            let amount = parse_amount(column(row, "amount", BUDGET_COMPILED_TABLE)?)?;
            let sum = total
                .unwrap_or(Decimal::ZERO)
                .checked_add(amount)
                .ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "budget total overflows for cp_id `{cp_id}` in {BUDGET_COMPILED_TABLE}"
                    ))
                })?;
            total = Some(sum);
        }
        Ok(total)
    }
}

fn parse_budget_row(row: &Row<'_>) -> RepoResult<BudgetEntity> {
    let release: ReleaseEntity = parse_release_row(row, BUDGET_COMPILED_TABLE)?;
    let amount = match column::<Option<String>>(row, "amount", BUDGET_COMPILED_TABLE)? {
        Some(value) => Some(parse_amount(value)?),
        None => None,
    };
    Ok(BudgetEntity { release, amount })
}

fn parse_amount(value: String) -> RepoResult<Decimal> {
    Decimal::from_str(&value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid amount `{value}` in {BUDGET_COMPILED_TABLE}.amount"
        ))
    })
}
