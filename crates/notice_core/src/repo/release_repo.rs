//! Release repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist one release as three rows (history, compiled, offset) in a single
//!   immediate transaction.
//! - Serve history, latest-state and change-feed reads.
//!
//! # Invariants
//! - Write paths call `ReleaseEntity::validate()` before opening a transaction.
//! - Rows are never updated or deleted; re-writing an identical key replaces
//!   the row with identical values, so writes are idempotent.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::release::{OffsetEntry, ReleaseEntity, ReleaseKey, ReleaseValidationError};
use crate::repo::schema::{ensure_columns, ensure_tables};
use rusqlite::types::{FromSql, Value};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) const RELEASE_TABLE: &str = "notice_release";
pub(crate) const COMPILED_RELEASE_TABLE: &str = "notice_compiled_release";
pub(crate) const OFFSET_TABLE: &str = "notice_offset";

/// Column mapping shared by history and compiled release tables.
pub(crate) const RELEASE_COLUMNS: &[&str] = &[
    "cp_id",
    "oc_id",
    "release_date",
    "release_id",
    "stage",
    "publish_date",
    "status",
    "json_data",
];
pub(crate) const OFFSET_COLUMNS: &[&str] = &["cp_id", "release_date"];

const HISTORY_DEFAULT_LIMIT: u32 = 10;
const HISTORY_LIMIT_MAX: u32 = 100;
const OFFSETS_DEFAULT_LIMIT: u32 = 100;
const OFFSETS_LIMIT_MAX: u32 = 1000;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for notice persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Required key fields are absent; detected before any storage call.
    MalformedInput(ReleaseValidationError),
    /// The store could not complete the operation (locked, read-only, I/O).
    StorageUnavailable(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput(err) => write!(f, "malformed input: {err}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted notice data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedInput(err) => Some(err),
            Self::StorageUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReleaseValidationError> for RepoError {
    fn from(value: ReleaseValidationError) -> Self {
        Self::MalformedInput(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StorageUnavailable(DbError::Sqlite(value))
    }
}

/// Pagination options for release history reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum rows to return. Defaults to 10 and clamps to 100.
    pub limit: Option<u32>,
    /// Number of newest rows to skip.
    pub offset: u32,
}

/// Filter options for change-feed polling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetQuery {
    /// Restricts the feed to one process.
    pub cp_id: Option<String>,
    /// Inclusive lower bound in epoch milliseconds.
    pub since: Option<i64>,
    /// Maximum rows to return. Defaults to 100 and clamps to 1000.
    pub limit: Option<u32>,
}

/// Repository interface for release writes and reads.
pub trait ReleaseRepository {
    /// Writes history, compiled and offset rows atomically.
    ///
    /// The compiled row receives the release payload unchanged.
    fn save_release(&mut self, release: &ReleaseEntity) -> RepoResult<()>;
    /// Same batch as `save_release` with an externally compiled payload.
    fn save_release_with_compiled(
        &mut self,
        release: &ReleaseEntity,
        compiled_json: &str,
    ) -> RepoResult<()>;
    /// Gets one history row by its full key.
    fn get_release(&self, key: &ReleaseKey) -> RepoResult<Option<ReleaseEntity>>;
    /// Lists history rows of one operation, newest first.
    fn list_history(
        &self,
        cp_id: &str,
        oc_id: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<ReleaseEntity>>;
    /// Gets the latest compiled row of one operation.
    fn get_compiled(&self, cp_id: &str, oc_id: &str) -> RepoResult<Option<ReleaseEntity>>;
    /// Gets the latest compiled row across all operations of a process.
    fn get_compiled_by_cp(&self, cp_id: &str) -> RepoResult<Option<ReleaseEntity>>;
    /// Lists change-feed entries in chronological order.
    fn list_offsets(&self, query: &OffsetQuery) -> RepoResult<Vec<OffsetEntry>>;
}

/// SQLite-backed release repository.
pub struct SqliteReleaseRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteReleaseRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_release_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ReleaseRepository for SqliteReleaseRepository<'_> {
    fn save_release(&mut self, release: &ReleaseEntity) -> RepoResult<()> {
        self.save_release_with_compiled(release, release.json_data.as_str())
    }

    fn save_release_with_compiled(
        &mut self,
        release: &ReleaseEntity,
        compiled_json: &str,
    ) -> RepoResult<()> {
        release.validate()?;
        if compiled_json.trim().is_empty() {
            return Err(RepoError::MalformedInput(
                ReleaseValidationError::MissingField("compiled_json"),
            ));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_release_row(&tx, RELEASE_TABLE, release, release.json_data.as_str())?;
        insert_release_row(&tx, COMPILED_RELEASE_TABLE, release, compiled_json)?;
        insert_offset_row(&tx, OFFSET_TABLE, &release.cp_id, release.release_date)?;
        tx.commit()?;
        Ok(())
    }

    fn get_release(&self, key: &ReleaseKey) -> RepoResult<Option<ReleaseEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE cp_id = ?1 AND oc_id = ?2 AND release_date = ?3 AND release_id = ?4;",
            release_select_sql(RELEASE_TABLE)
        ))?;
        let mut rows = stmt.query(params![
            key.cp_id.as_str(),
            key.oc_id.as_str(),
            key.release_date,
            key.release_id.as_str(),
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_release_row(row, RELEASE_TABLE)?));
        }
        Ok(None)
    }

    fn list_history(
        &self,
        cp_id: &str,
        oc_id: &str,
        query: &HistoryQuery,
    ) -> RepoResult<Vec<ReleaseEntity>> {
        let mut sql = format!(
            "{} WHERE cp_id = ? AND oc_id = ?",
            release_select_sql(RELEASE_TABLE)
        );
        let mut bind_values = vec![
            Value::Text(cp_id.to_string()),
            Value::Text(oc_id.to_string()),
        ];

        sql.push_str(" ORDER BY release_date DESC, release_id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_history_limit(
            query.limit,
        ))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut releases = Vec::new();
        while let Some(row) = rows.next()? {
            releases.push(parse_release_row(row, RELEASE_TABLE)?);
        }
        Ok(releases)
    }

    fn get_compiled(&self, cp_id: &str, oc_id: &str) -> RepoResult<Option<ReleaseEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE cp_id = ?1 AND oc_id = ?2
             ORDER BY release_date DESC, release_id ASC
             LIMIT 1;",
            release_select_sql(COMPILED_RELEASE_TABLE)
        ))?;
        let mut rows = stmt.query([cp_id, oc_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_release_row(row, COMPILED_RELEASE_TABLE)?));
        }
        Ok(None)
    }

    fn get_compiled_by_cp(&self, cp_id: &str) -> RepoResult<Option<ReleaseEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE cp_id = ?1
             ORDER BY release_date DESC, oc_id ASC, release_id ASC
             LIMIT 1;",
            release_select_sql(COMPILED_RELEASE_TABLE)
        ))?;
        let mut rows = stmt.query([cp_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_release_row(row, COMPILED_RELEASE_TABLE)?));
        }
        Ok(None)
    }

    fn list_offsets(&self, query: &OffsetQuery) -> RepoResult<Vec<OffsetEntry>> {
        let mut sql = format!("SELECT cp_id, release_date FROM {OFFSET_TABLE} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(cp_id) = query.cp_id.as_ref() {
            sql.push_str(" AND cp_id = ?");
            bind_values.push(Value::Text(cp_id.clone()));
        }
        if let Some(since) = query.since {
            sql.push_str(" AND release_date >= ?");
            bind_values.push(Value::Integer(since));
        }

        sql.push_str(" ORDER BY release_date ASC, cp_id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_offsets_limit(
            query.limit,
        ))));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut offsets = Vec::new();
        while let Some(row) = rows.next()? {
            offsets.push(OffsetEntry {
                cp_id: column(row, "cp_id", OFFSET_TABLE)?,
                release_date: column(row, "release_date", OFFSET_TABLE)?,
            });
        }
        Ok(offsets)
    }
}

/// Normalizes history page size according to the history contract.
pub fn normalize_history_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => HISTORY_DEFAULT_LIMIT,
        Some(value) if value > HISTORY_LIMIT_MAX => HISTORY_LIMIT_MAX,
        Some(value) => value,
    }
}

/// Normalizes change-feed page size.
pub fn normalize_offsets_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => OFFSETS_DEFAULT_LIMIT,
        Some(value) if value > OFFSETS_LIMIT_MAX => OFFSETS_LIMIT_MAX,
        Some(value) => value,
    }
}

pub(crate) fn release_columns_sql() -> String {
    RELEASE_COLUMNS.join(", ")
}

fn release_select_sql(table: &str) -> String {
    format!("SELECT {} FROM {table}", release_columns_sql())
}

pub(crate) fn insert_release_row(
    tx: &Transaction<'_>,
    table: &str,
    release: &ReleaseEntity,
    json_data: &str,
) -> RepoResult<()> {
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO {table} (
                cp_id,
                oc_id,
                release_date,
                release_id,
                stage,
                publish_date,
                status,
                json_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);"
        ),
        params![
            release.cp_id.as_str(),
            release.oc_id.as_str(),
            release.release_date,
            release.release_id.as_str(),
            release.stage.as_str(),
            release.publish_date,
            release.status.as_deref(),
            json_data,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_offset_row(
    tx: &Transaction<'_>,
    table: &str,
    cp_id: &str,
    release_date: i64,
) -> RepoResult<()> {
    tx.execute(
        &format!("INSERT OR REPLACE INTO {table} (cp_id, release_date) VALUES (?1, ?2);"),
        params![cp_id, release_date],
    )?;
    Ok(())
}

pub(crate) fn parse_release_row(row: &Row<'_>, table: &str) -> RepoResult<ReleaseEntity> {
    let release = ReleaseEntity {
        cp_id: column(row, "cp_id", table)?,
        oc_id: column(row, "oc_id", table)?,
        release_id: column(row, "release_id", table)?,
        stage: column(row, "stage", table)?,
        release_date: column(row, "release_date", table)?,
        publish_date: column(row, "publish_date", table)?,
        status: column(row, "status", table)?,
        json_data: column(row, "json_data", table)?,
    };
    release.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "row `{}/{}/{}` in {table}: {err}",
            release.cp_id, release.oc_id, release.release_id
        ))
    })?;
    Ok(release)
}

/// Reads one column, reporting undecodable values as `InvalidData`.
pub(crate) fn column<T: FromSql>(row: &Row<'_>, name: &str, table: &str) -> RepoResult<T> {
    row.get(name).map_err(|err| {
        if matches!(
            err,
            rusqlite::Error::InvalidColumnType(..)
                | rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::IntegralValueOutOfRange(..)
        ) {
            RepoError::InvalidData(format!("column `{table}.{name}`: {err}"))
        } else {
            RepoError::from(err)
        }
    })
}

pub(crate) fn ensure_schema_version(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

fn ensure_release_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_schema_version(conn)?;
    ensure_tables(conn, &[RELEASE_TABLE, COMPILED_RELEASE_TABLE, OFFSET_TABLE])?;
    ensure_columns(conn, RELEASE_TABLE, RELEASE_COLUMNS)?;
    ensure_columns(conn, COMPILED_RELEASE_TABLE, RELEASE_COLUMNS)?;
    ensure_columns(conn, OFFSET_TABLE, OFFSET_COLUMNS)?;
    Ok(())
}
