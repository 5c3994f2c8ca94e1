/*!
End-to-end tests for the backup, report and restore pipeline.

Every test runs against the in-memory record store and a temporary output
directory.
*/

use std::fs;
use std::path::Path;

use rand::Rng;
use serde_json::{json, Value};
use tablesnap_core::{
    read_snapshot, restore_file, scan_table, BackupEngine, BackupRequest, DiffConfig,
    MemoryRecordStore, Record, ReportFormat, ReportOutcome, SnapshotSelector, SnapshotWriter,
    TableSnapError,
};
use tempfile::TempDir;

fn users(count: u64) -> Value {
    Value::Array(
        (1..=count)
            .map(|id| json!({"id": id, "number": id, "name": format!("user-{id}")}))
            .collect(),
    )
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_scan_collects_every_page() {
    let mut rng = rand::thread_rng();

    for _ in 0..10 {
        let total = rng.gen_range(0..300u64);
        let page_size = rng.gen_range(1..40usize);
        let store = MemoryRecordStore::new("id").with_page_size(page_size);
        store.insert("users", users(total)).unwrap();

        let records = scan_table(&store, "users").unwrap();

        assert_eq!(records.len() as u64, total);
        assert_eq!(Some(records), store.records("users"));
        let expected_requests = (total as usize).div_ceil(page_size).max(1);
        assert_eq!(store.scan_requests(), expected_requests);
    }
}

#[test]
fn test_scan_failure_on_later_page() {
    let store = MemoryRecordStore::new("id").with_page_size(10);
    store.insert("users", users(35)).unwrap();
    store.fail_scan_at(3);

    let result = scan_table(&store, "users");
    assert!(matches!(result, Err(TableSnapError::Retrieval(_))));
}

#[test]
fn test_snapshot_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = MemoryRecordStore::new("id");
    store
        .insert(
            "mixed",
            json!([
                {"id": "a", "nested": {"list": [1, 2.5, null], "flag": true}},
                {"id": "b", "empty": {}, "unicode": "żółw"}
            ]),
        )
        .unwrap();

    let records = scan_table(&store, "mixed").unwrap();
    let path = SnapshotWriter::new(temp_dir.path())
        .write(&records, "mixed", None)
        .unwrap();

    assert_eq!(read_snapshot(&path).unwrap(), records);
}

#[test]
fn test_selector_picks_most_recent() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("t_2024-01-01_0000.json"), "[]").unwrap();
    fs::write(temp_dir.path().join("t_2024-02-01_0000.json"), "[]").unwrap();

    let previous = SnapshotSelector::default()
        .find_previous(temp_dir.path(), "t")
        .unwrap();

    assert_eq!(previous, Some(temp_dir.path().join("t_2024-02-01_0000.json")));
}

#[test]
fn test_backup_twice_reports_changes() {
    let temp_dir = TempDir::new().unwrap();
    let store = MemoryRecordStore::new("id");
    store.insert("users", users(3)).unwrap();

    // Stands in for a run from an earlier minute
    let earlier = scan_table(&store, "users").unwrap();
    fs::write(
        temp_dir.path().join("users_2000-01-01_0000.json"),
        serde_json::to_vec(&earlier).unwrap(),
    )
    .unwrap();

    store
        .insert(
            "users",
            json!([
                {"id": 2, "number": 2, "name": "renamed"},
                {"id": 4, "number": 0, "name": "user-4"}
            ]),
        )
        .unwrap();

    let engine = BackupEngine::new(store, DiffConfig::default());
    let outcome = engine
        .backup(&BackupRequest::new("users", temp_dir.path()).with_report(ReportFormat::Json))
        .unwrap();

    assert_eq!(outcome.record_count, 4);
    let ReportOutcome::Written { path, changes, .. } = outcome.report else {
        panic!("expected a written report, got {:?}", outcome.report);
    };
    assert_eq!(changes, 2);
    assert_eq!(
        read_json(&path),
        json!([
            {"new": {"id": 4, "number": 0, "name": "user-4"}},
            {
                "old": {"id": 2, "number": 2, "name": "user-2"},
                "new": {"id": 2, "number": 2, "name": "renamed"}
            }
        ])
    );
}

#[test]
fn test_report_failure_keeps_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("users_2000-01-01_0000.json"), "[]").unwrap();

    let store = MemoryRecordStore::new("id");
    store.insert("users", json!([{"id": 1, "number": "one"}])).unwrap();

    let engine = BackupEngine::new(store, DiffConfig::default());
    let outcome = engine
        .backup(&BackupRequest::new("users", temp_dir.path()).with_report(ReportFormat::Json))
        .unwrap();

    assert!(matches!(
        outcome.report,
        ReportOutcome::Failed(TableSnapError::Ordering(_))
    ));
    assert_eq!(read_json(&outcome.snapshot_path), json!([{"id": 1, "number": "one"}]));
    assert!(!temp_dir.path().join("reports").exists());
}

#[test]
fn test_base_file_name_override() {
    let temp_dir = TempDir::new().unwrap();
    let store = MemoryRecordStore::new("id");
    store.insert("users", users(1)).unwrap();

    let engine = BackupEngine::new(store, DiffConfig::default());
    let outcome = engine
        .backup(
            &BackupRequest::new("users", temp_dir.path())
                .with_base_file_name("prod_users")
                .with_timestamp(false),
        )
        .unwrap();

    assert_eq!(outcome.snapshot_path, temp_dir.path().join("prod_users.json"));
}

#[test]
fn test_restore_reproduces_the_table() {
    let temp_dir = TempDir::new().unwrap();
    let source = MemoryRecordStore::new("id").with_page_size(7);
    source.insert("users", users(60)).unwrap();

    let engine = BackupEngine::new(source.clone(), DiffConfig::default());
    let outcome = engine
        .backup(&BackupRequest::new("users", temp_dir.path()))
        .unwrap();

    let target = MemoryRecordStore::new("id");
    target.create_table("users_copy");
    let summary = restore_file(&target, "users_copy", &outcome.snapshot_path).unwrap();

    assert_eq!(summary.records_written, 60);
    assert_eq!(target.records("users_copy"), source.records("users"));

    restore_file(&target, "users_copy", &outcome.snapshot_path).unwrap();
    assert_eq!(target.records("users_copy").map(|r| r.len()), Some(60));
}

#[test]
fn test_restore_rejects_non_array_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.json");
    fs::write(&path, r#"{"id": 1}"#).unwrap();

    let target = MemoryRecordStore::new("id");
    target.create_table("t");

    let result = restore_file(&target, "t", &path);
    assert!(matches!(result, Err(TableSnapError::InvalidFormat(_))));
    assert_eq!(target.records("t"), Some(Vec::<Record>::new()));
}
