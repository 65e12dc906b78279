use notice_core::db::{open_db, open_db_in_memory, open_db_with_busy_timeout};
use notice_core::{
    HistoryQuery, OffsetEntry, OffsetQuery, ReleaseEntity, ReleaseRepository,
    ReleaseValidationError, RepoError, SqliteReleaseRepository,
};
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;

const T1: i64 = 1_700_000_000_000;
const T2: i64 = 1_700_000_060_000;

fn release(cp_id: &str, oc_id: &str, release_id: &str, release_date: i64, json: &str) -> ReleaseEntity {
    ReleaseEntity {
        cp_id: cp_id.to_string(),
        oc_id: oc_id.to_string(),
        release_id: release_id.to_string(),
        stage: "tender".to_string(),
        release_date,
        publish_date: T1,
        status: Some("active".to_string()),
        json_data: json.to_string(),
    }
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn assert_row_counts(conn: &Connection, expected: i64) {
    for table in ["notice_release", "notice_compiled_release", "notice_offset"] {
        assert_eq!(row_count(conn, table), expected, "unexpected rows in {table}");
    }
}

#[test]
fn single_write_is_discoverable_through_all_three_paths() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let payload = r#"{"tender":{"id":"T1"}}"#;
    let written = release("P1", "OC1", "R1", T1, payload);

    repo.save_release(&written).unwrap();

    let history = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap();
    assert_eq!(history, vec![written.clone()]);

    let by_key = repo.get_release(&written.key()).unwrap();
    assert_eq!(by_key.as_ref(), Some(&written));

    let compiled = repo.get_compiled("P1", "OC1").unwrap().unwrap();
    assert_eq!(compiled.key(), written.key());
    assert_eq!(compiled.json_data, payload);

    let offsets = repo
        .list_offsets(&OffsetQuery {
            cp_id: Some("P1".to_string()),
            ..OffsetQuery::default()
        })
        .unwrap();
    assert_eq!(
        offsets,
        vec![OffsetEntry {
            cp_id: "P1".to_string(),
            release_date: T1,
        }]
    );

    drop(repo);
    assert_row_counts(&conn, 1);
}

#[test]
fn writing_same_release_twice_is_idempotent() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let written = release("P1", "OC1", "R1", T1, r#"{"tender":{"id":"T1"}}"#);

    repo.save_release(&written).unwrap();
    let after_first = repo.get_release(&written.key()).unwrap();
    repo.save_release(&written).unwrap();
    let after_second = repo.get_release(&written.key()).unwrap();

    assert_eq!(after_first, after_second);
    drop(repo);
    assert_row_counts(&conn, 1);
}

#[test]
fn later_release_is_returned_first_and_both_remain_retrievable() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let first = release("P1", "OC1", "R1", T1, r#"{"tender":{"id":"T1"}}"#);
    let second = release("P1", "OC1", "R2", T2, r#"{"tender":{"id":"T1","status":"complete"}}"#);

    repo.save_release(&first).unwrap();
    repo.save_release(&second).unwrap();

    let history = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap();
    assert_eq!(history, vec![second.clone(), first.clone()]);

    let compiled = repo.get_compiled("P1", "OC1").unwrap().unwrap();
    assert_eq!(compiled.release_date, T2);
    assert_eq!(compiled.json_data, second.json_data);

    assert_eq!(repo.get_release(&first.key()).unwrap(), Some(first));
    assert_eq!(repo.get_release(&second.key()).unwrap(), Some(second));
}

#[test]
fn insertion_order_does_not_affect_latest_first_ordering() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let newer = release("P1", "OC1", "R2", T2, r#"{"v":2}"#);
    let older = release("P1", "OC1", "R1", T1, r#"{"v":1}"#);

    repo.save_release(&newer).unwrap();
    repo.save_release(&older).unwrap();

    let compiled = repo.get_compiled("P1", "OC1").unwrap().unwrap();
    assert_eq!(compiled.release_id, "R2");
    let history = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap();
    let ids: Vec<_> = history.iter().map(|item| item.release_id.as_str()).collect();
    assert_eq!(ids, vec!["R2", "R1"]);
}

#[test]
fn missing_process_id_is_malformed_and_writes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let invalid = release("", "OC1", "R1", T1, r#"{"tender":{"id":"T1"}}"#);

    let err = repo.save_release(&invalid).unwrap_err();
    assert!(matches!(
        err,
        RepoError::MalformedInput(ReleaseValidationError::MissingField("cp_id"))
    ));

    drop(repo);
    assert_row_counts(&conn, 0);
}

#[test]
fn blank_compiled_payload_is_malformed() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let written = release("P1", "OC1", "R1", T1, r#"{"v":1}"#);

    let err = repo.save_release_with_compiled(&written, " ").unwrap_err();
    assert!(matches!(err, RepoError::MalformedInput(_)));

    drop(repo);
    assert_row_counts(&conn, 0);
}

#[test]
fn compiled_payload_can_differ_from_history_payload() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let written = release("P1", "OC1", "R1", T1, r#"{"v":1}"#);

    repo.save_release_with_compiled(&written, r#"{"v":1,"merged":true}"#)
        .unwrap();

    let history = repo.get_release(&written.key()).unwrap().unwrap();
    assert_eq!(history.json_data, r#"{"v":1}"#);
    let compiled = repo.get_compiled("P1", "OC1").unwrap().unwrap();
    assert_eq!(compiled.json_data, r#"{"v":1,"merged":true}"#);
}

#[test]
fn read_only_store_reports_storage_unavailable_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notice.db");
    drop(open_db(&path).unwrap());

    let mut read_only = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut read_only).unwrap();
    let err = repo
        .save_release(&release("P1", "OC1", "R1", T1, r#"{"v":1}"#))
        .unwrap_err();
    assert!(matches!(err, RepoError::StorageUnavailable(_)), "{err}");
    drop(repo);

    let conn = open_db(&path).unwrap();
    assert_row_counts(&conn, 0);
}

#[test]
fn locked_store_reports_storage_unavailable_without_partial_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notice.db");
    let holder = open_db(&path).unwrap();
    let mut writer = open_db_with_busy_timeout(&path, Duration::ZERO).unwrap();

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    {
        let mut repo = SqliteReleaseRepository::try_new(&mut writer).unwrap();
        let err = repo
            .save_release(&release("P1", "OC1", "R1", T1, r#"{"v":1}"#))
            .unwrap_err();
        assert!(matches!(err, RepoError::StorageUnavailable(_)), "{err}");
    }
    holder.execute_batch("ROLLBACK;").unwrap();

    assert_row_counts(&holder, 0);
}

#[test]
fn concrete_publication_scenario() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    let first_payload = r#"{"tender":{"id":"T1"}}"#;
    let second_payload = r#"{"tender":{"id":"T1","status":"active"}}"#;

    repo.save_release(&release("P1", "OC1", "R1", T1, first_payload))
        .unwrap();

    let history_row = repo
        .get_release(&notice_core::ReleaseKey {
            cp_id: "P1".to_string(),
            oc_id: "OC1".to_string(),
            release_date: T1,
            release_id: "R1".to_string(),
        })
        .unwrap()
        .unwrap();
    assert_eq!(history_row.stage, "tender");
    assert_eq!(history_row.json_data, first_payload);
    assert_eq!(
        repo.get_compiled("P1", "OC1").unwrap().unwrap().json_data,
        first_payload
    );

    repo.save_release(&release("P1", "OC1", "R2", T2, second_payload))
        .unwrap();

    let history = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].json_data, second_payload);
    assert_eq!(history[1].json_data, first_payload);
    assert_eq!(
        repo.get_compiled("P1", "OC1").unwrap().unwrap().json_data,
        second_payload
    );

    let offsets = repo.list_offsets(&OffsetQuery::default()).unwrap();
    let dates: Vec<_> = offsets.iter().map(|entry| entry.release_date).collect();
    assert_eq!(dates, vec![T1, T2]);
}

#[test]
fn processes_are_independent() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    repo.save_release(&release("P1", "OC1", "R1", T1, r#"{"v":1}"#))
        .unwrap();
    repo.save_release(&release("P2", "OC9", "R9", T2, r#"{"v":9}"#))
        .unwrap();

    assert!(repo.get_compiled("P1", "OC9").unwrap().is_none());
    assert_eq!(
        repo.get_compiled_by_cp("P2").unwrap().unwrap().release_id,
        "R9"
    );
    let p1_history = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap();
    assert_eq!(p1_history.len(), 1);
}

#[test]
fn compiled_by_cp_returns_latest_operation_of_process() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    repo.save_release(&release("P1", "P1", "MS-1", T1, r#"{"ms":true}"#))
        .unwrap();
    repo.save_release(&release("P1", "P1-EV-1", "EV-1", T2, r#"{"ev":true}"#))
        .unwrap();

    let latest = repo.get_compiled_by_cp("P1").unwrap().unwrap();
    assert_eq!(latest.oc_id, "P1-EV-1");
    assert!(repo.get_compiled_by_cp("missing").unwrap().is_none());
}

#[test]
fn history_pagination_and_offset_polling_are_stable() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();
    for idx in 0..5_i64 {
        repo.save_release(&release(
            "P1",
            "OC1",
            &format!("R{idx}"),
            T1 + idx,
            r#"{"v":1}"#,
        ))
        .unwrap();
    }
    repo.save_release(&release("P2", "OC2", "X", T1 + 2, r#"{"v":2}"#))
        .unwrap();

    let page = repo
        .list_history(
            "P1",
            "OC1",
            &HistoryQuery {
                limit: Some(2),
                offset: 1,
            },
        )
        .unwrap();
    let ids: Vec<_> = page.iter().map(|item| item.release_id.as_str()).collect();
    assert_eq!(ids, vec!["R3", "R2"]);

    let feed = repo
        .list_offsets(&OffsetQuery {
            cp_id: None,
            since: Some(T1 + 2),
            limit: Some(3),
        })
        .unwrap();
    let entries: Vec<_> = feed
        .iter()
        .map(|entry| (entry.cp_id.as_str(), entry.release_date))
        .collect();
    assert_eq!(entries, vec![("P1", T1 + 2), ("P2", T1 + 2), ("P1", T1 + 3)]);
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let mut conn = Connection::open_in_memory().unwrap();
    let result = SqliteReleaseRepository::try_new(&mut conn);
    match result {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_offset_table() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE notice_offset;").unwrap();

    let result = SqliteReleaseRepository::try_new(&mut conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("notice_offset"))
    ));
}

#[test]
fn undecodable_history_row_is_invalid_data_not_outage() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO notice_release
            (cp_id, oc_id, release_date, release_id, stage, publish_date, status, json_data)
         VALUES ('P1', 'OC1', 'not-a-date', 'R1', 'tender', 1, NULL, '{}');",
        [],
    )
    .unwrap();
    let repo = SqliteReleaseRepository::try_new(&mut conn).unwrap();

    let err = repo
        .list_history("P1", "OC1", &HistoryQuery::default())
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)), "{err}");
}
