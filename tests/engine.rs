//! End-to-end scenarios exercising the engine's durability, isolation, and
//! two-phase-commit guarantees entirely through the public
//! `Engine`/`LogicalDB` API.

use partitiondb::{EngineConfig, EngineError, OpType, PatchOp, Query};
use partitiondb::db::LogicalDB;
use tempfile::tempdir;

fn open_db(dir: &std::path::Path, name: &str) -> LogicalDB {
    LogicalDB::open(name, 1, dir, dir, EngineConfig::testing()).unwrap()
}

#[test]
fn single_partition_create_and_read_roundtrips() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create("_default", 1, br#"{"name":"alice"}"#.to_vec()).unwrap();
    assert_eq!(db.read("_default", 1).unwrap(), br#"{"name":"alice"}"#.to_vec());
}

#[test]
fn crash_before_commit_leaves_no_visible_document() {
    let dir = tempdir().unwrap();
    {
        let db = open_db(dir.path(), "t");
        let tx = db.begin();
        db.add_op_to_tx(tx, "_default", OpType::Create, 1, br#"{"x":1}"#.to_vec()).unwrap();
        // Transaction deliberately never committed or rolled back: simulates
        // a process crash between WAL-write-of-ops and the commit marker
        // (no commit marker is ever written here since `commit` is never called).
    }
    let db = open_db(dir.path(), "t");
    assert!(matches!(db.read("_default", 1), Err(EngineError::NotFound(_))));
}

#[test]
fn crash_after_commit_document_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let db = open_db(dir.path(), "t");
        db.create("_default", 1, br#"{"x":1}"#.to_vec()).unwrap();
    }
    let db = open_db(dir.path(), "t");
    assert_eq!(db.read("_default", 1).unwrap(), br#"{"x":1}"#.to_vec());
}

#[test]
fn two_phase_commit_across_partitions_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");

    let tx = db.begin();
    // doc_id 1 and doc_id 2 land on different partitions under num_partitions=2.
    db.add_op_to_tx(tx, "_default", OpType::Create, 1, br#"{"a":1}"#.to_vec()).unwrap();
    db.add_op_to_tx(tx, "_default", OpType::Create, 2, br#"{"b":2}"#.to_vec()).unwrap();
    db.commit(tx).unwrap();

    assert_eq!(db.read("_default", 1).unwrap(), br#"{"a":1}"#.to_vec());
    assert_eq!(db.read("_default", 2).unwrap(), br#"{"b":2}"#.to_vec());
}

#[test]
fn two_phase_commit_rolls_back_on_conflicting_create() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create("_default", 2, b"already-here".to_vec()).unwrap();

    let tx = db.begin();
    db.add_op_to_tx(tx, "_default", OpType::Create, 1, b"new".to_vec()).unwrap();
    db.add_op_to_tx(tx, "_default", OpType::Create, 2, b"conflict".to_vec()).unwrap();
    let result = db.commit(tx);
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));

    // Doc 1 must not have been partially committed on its partition.
    assert!(matches!(db.read("_default", 1), Err(EngineError::NotFound(_))));
    assert_eq!(db.read("_default", 2).unwrap(), b"already-here".to_vec());
}

#[test]
fn ssi_lite_detects_write_skew_between_concurrent_transactions() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create("_default", 1, br#"{"balance":100}"#.to_vec()).unwrap();

    let tx_b = db.begin();
    let tx_a = db.begin();

    // tx_a reads doc 1, then writes doc 2 based on what it saw.
    db.read_in_tx(tx_a, "_default", 1).unwrap();
    db.add_op_to_tx(tx_a, "_default", OpType::Create, 2, b"derived-from-1".to_vec()).unwrap();
    db.commit(tx_a).unwrap();

    // tx_b started concurrently, also read doc 1 under the same snapshot,
    // and now tries to write doc 1 itself: write-skew, should be rejected.
    db.read_in_tx(tx_b, "_default", 1).unwrap();
    db.add_op_to_tx(tx_b, "_default", OpType::Update, 1, br#"{"balance":50}"#.to_vec()).unwrap();
    let result = db.commit(tx_b);
    assert!(matches!(result, Err(EngineError::SerializationFailure)));

    assert_eq!(db.read("_default", 1).unwrap(), br#"{"balance":100}"#.to_vec());
}

#[test]
fn query_runs_under_one_fixed_snapshot() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create("_default", 1, b"a".to_vec()).unwrap();
    db.create("_default", 2, b"b".to_vec()).unwrap();

    let result = db.execute_query("_default", &Query::all()).unwrap();
    assert_eq!(result.rows.len(), 2);
    let ids: Vec<u64> = result.rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn patch_then_read_reflects_applied_changes() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create("_default", 1, br#"{"count":1}"#.to_vec()).unwrap();
    db.patch(
        "_default",
        1,
        &[PatchOp::Set { path: "/count".into(), value: serde_json::json!(2) }],
    )
    .unwrap();
    let got: serde_json::Value = serde_json::from_slice(&db.read("_default", 1).unwrap()).unwrap();
    assert_eq!(got["count"], serde_json::json!(2));
}

#[test]
fn collection_lifecycle_blocks_deletion_while_documents_remain() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path(), "t");
    db.create_collection("orders").unwrap();
    db.create("orders", 1, b"payload".to_vec()).unwrap();

    assert!(matches!(db.delete_collection("orders"), Err(EngineError::CollectionNotEmpty(_))));
    db.delete("orders", 1).unwrap();
    db.delete_collection("orders").unwrap();
    assert!(!db.list_collections().contains(&"orders".to_string()));
}
