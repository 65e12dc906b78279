//! Package repository contracts and SQLite implementation.
//!
//! # Invariants
//! - One package write is one upsert on `notice_package`; no batch is needed.
//! - Reads are newest-first by `package_date`.

use crate::model::package::PackageEntity;
use crate::repo::release_repo::{column, ensure_schema_version, RepoError, RepoResult};
use crate::repo::schema::{ensure_columns, ensure_tables};
use rusqlite::{params, Connection, Row};

const PACKAGE_TABLE: &str = "notice_package";
const PACKAGE_COLUMNS: &[&str] = &["cp_id", "package_date", "json_data"];
const PACKAGES_DEFAULT_LIMIT: u32 = 10;
const PACKAGES_LIMIT_MAX: u32 = 100;

/// Repository interface for package writes and reads.
pub trait PackageRepository {
    fn save_package(&self, package: &PackageEntity) -> RepoResult<()>;
    fn get_latest_package(&self, cp_id: &str) -> RepoResult<Option<PackageEntity>>;
    /// Lists packages newest first. Defaults to 10 and clamps to 100.
    fn list_packages(&self, cp_id: &str, limit: Option<u32>) -> RepoResult<Vec<PackageEntity>>;
}

/// SQLite-backed package repository.
pub struct SqlitePackageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePackageRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(conn, &[PACKAGE_TABLE])?;
        ensure_columns(conn, PACKAGE_TABLE, PACKAGE_COLUMNS)?;
        Ok(Self { conn })
    }
}

impl PackageRepository for SqlitePackageRepository<'_> {
    fn save_package(&self, package: &PackageEntity) -> RepoResult<()> {
        package.validate()?;

        self.conn.execute(
            "INSERT OR REPLACE INTO notice_package (
                cp_id,
                package_date,
                json_data
            ) VALUES (?1, ?2, ?3);",
            params![
                package.cp_id.as_str(),
                package.package_date,
                package.json_data.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_latest_package(&self, cp_id: &str) -> RepoResult<Option<PackageEntity>> {
        let mut packages = self.list_packages(cp_id, Some(1))?;
        Ok(packages.pop())
    }

    fn list_packages(&self, cp_id: &str, limit: Option<u32>) -> RepoResult<Vec<PackageEntity>> {
        let mut stmt = self.conn.prepare(
            "SELECT cp_id, package_date, json_data
             FROM notice_package
             WHERE cp_id = ?1
             ORDER BY package_date DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![cp_id, i64::from(normalize_package_limit(limit))])?;
        let mut packages = Vec::new();
        while let Some(row) = rows.next()? {
            packages.push(parse_package_row(row)?);
        }
        Ok(packages)
    }
}

fn normalize_package_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => PACKAGES_DEFAULT_LIMIT,
        Some(value) if value > PACKAGES_LIMIT_MAX => PACKAGES_LIMIT_MAX,
        Some(value) => value,
    }
}

fn parse_package_row(row: &Row<'_>) -> RepoResult<PackageEntity> {
    let package = PackageEntity {
        cp_id: column(row, "cp_id", PACKAGE_TABLE)?,
        package_date: column(row, "package_date", PACKAGE_TABLE)?,
        json_data: column(row, "json_data", PACKAGE_TABLE)?,
    };
    package.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "package `{}` at {} in {PACKAGE_TABLE}: {err}",
            package.cp_id, package.package_date
        ))
    })?;
    Ok(package)
}
