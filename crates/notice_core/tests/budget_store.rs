use notice_core::db::{open_db, open_db_in_memory};
use notice_core::{BudgetEntity, BudgetRepository, ReleaseEntity, RepoError, SqliteBudgetRepository};
use rusqlite::{Connection, OpenFlags};
use rust_decimal::Decimal;
use std::str::FromStr;

fn budget(oc_id: &str, release_id: &str, release_date: i64, amount: Option<&str>) -> BudgetEntity {
    BudgetEntity {
        release: ReleaseEntity {
            cp_id: "EI-1".to_string(),
            oc_id: oc_id.to_string(),
            release_id: release_id.to_string(),
            stage: "fs".to_string(),
            release_date,
            publish_date: 1_000,
            status: Some("active".to_string()),
            json_data: format!(r#"{{"ocid":"{oc_id}","id":"{release_id}"}}"#),
        },
        amount: amount.map(|value| Decimal::from_str(value).unwrap()),
    }
}

#[test]
fn budget_write_produces_history_compiled_and_offset_rows() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();
        let written = budget("EI-1-FS-1", "FS-r1", 2_000, Some("1500.50"));
        repo.save_budget(&written).unwrap();

        let loaded = repo.get_budget_by_oc("EI-1", "EI-1-FS-1").unwrap().unwrap();
        assert_eq!(loaded, written);
    }

    for table in [
        "notice_budget_release",
        "notice_budget_compiled_release",
        "notice_budget_offset",
    ] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1, "unexpected rows in {table}");
    }
}

#[test]
fn total_amount_sums_latest_amount_of_each_operation() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();

    repo.save_budget(&budget("EI-1", "EI-r1", 1_000, None)).unwrap();
    repo.save_budget(&budget("EI-1-FS-1", "FS1-r1", 2_000, Some("100.10")))
        .unwrap();
    repo.save_budget(&budget("EI-1-FS-1", "FS1-r2", 3_000, Some("250.00")))
        .unwrap();
    repo.save_budget(&budget("EI-1-FS-2", "FS2-r1", 2_500, Some("49.95")))
        .unwrap();

    let total = repo.total_amount("EI-1").unwrap();
    assert_eq!(total, Some(Decimal::from_str("299.95").unwrap()));
    assert_eq!(repo.total_amount("EI-2").unwrap(), None);

    let latest = repo.get_budget("EI-1").unwrap().unwrap();
    assert_eq!(latest.release.release_id, "FS1-r2");
}

#[test]
fn malformed_budget_is_rejected_before_storage() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();
    let mut invalid = budget("EI-1", "EI-r1", 1_000, None);
    invalid.release.release_id = String::new();

    let err = repo.save_budget(&invalid).unwrap_err();
    assert!(matches!(err, RepoError::MalformedInput(_)));
    assert!(repo.get_budget("EI-1").unwrap().is_none());
}

#[test]
fn corrupted_amount_is_reported_as_invalid_data() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();
        repo.save_budget(&budget("EI-1", "EI-r1", 1_000, Some("10")))
            .unwrap();
    }
    conn.execute(
        "UPDATE notice_budget_compiled_release SET amount = 'ten';",
        [],
    )
    .unwrap();

    let repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();
    assert!(matches!(
        repo.total_amount("EI-1"),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn overflowing_total_is_reported_as_invalid_data() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBudgetRepository::try_new(&mut conn).unwrap();
    let mut first = budget("EI-1-FS-1", "FS1-r1", 2_000, None);
    first.amount = Some(Decimal::MAX);
    let mut second = budget("EI-1-FS-2", "FS2-r1", 2_000, None);
    second.amount = Some(Decimal::MAX);
    repo.save_budget(&first).unwrap();
    repo.save_budget(&second).unwrap();

    let err = repo.total_amount("EI-1").unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)), "{err}");
}

#[test]
fn read_only_store_reports_storage_unavailable_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notice.db");
    drop(open_db(&path).unwrap());

    let mut read_only =
        Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap();
    {
        let mut repo = SqliteBudgetRepository::try_new(&mut read_only).unwrap();
        let err = repo
            .save_budget(&budget("EI-1-FS-1", "FS1-r1", 2_000, Some("10")))
            .unwrap_err();
        assert!(matches!(err, RepoError::StorageUnavailable(_)), "{err}");
    }

    let conn = open_db(&path).unwrap();
    for table in [
        "notice_budget_release",
        "notice_budget_compiled_release",
        "notice_budget_offset",
    ] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 0, "unexpected rows in {table}");
    }
}
