//! End-to-end load tests against DuckDB files.
//!
//! Each test creates the table, runs the orchestrator, closes every handle,
//! and then reopens the file to inspect what was made durable.

mod common;

use salesload::{
    run_load, CommitAlignment, CommitPolicy, Engine, Error, LoadConfig, LoadOrchestrator,
    TableReader, Verifier,
};

fn config(rows: u64, batch: usize) -> LoadConfig {
    LoadConfig {
        seed: Some(42),
        ..LoadConfig::with_rows(rows, batch)
    }
}

/// 2000 rows in batches of 1000 with the legacy commit alignment: two
/// commit events (after batch 0 and the final one), ids 1..=2000.
#[test]
fn two_batch_run_commits_twice_and_loads_every_id() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "two_batches.duckdb");
    let mut cfg = config(2000, 1000);
    cfg.commit = CommitPolicy::every(10).with_alignment(CommitAlignment::FirstBatch);

    let mut counter = common::CommitCounter::default();
    let summary = run_load(Engine::DuckDb, &path, &cfg, &mut counter).unwrap();

    assert_eq!(summary.rows_loaded, 2000);
    assert_eq!(summary.commits, 2);
    assert_eq!(counter.commits.len(), 2);
    assert_eq!(counter.last_report, Some((2, 2)));

    let ids = common::read_duckdb_ids(&path);
    assert_eq!(ids, (1..=2000).collect::<Vec<i64>>());

    let reader = common::open_read_only(Engine::DuckDb, &path);
    assert_eq!(reader.duplicate_count().unwrap(), 0);
}

#[test]
fn remainder_is_rejected_before_any_insert() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "remainder.duckdb");

    let err = run_load(Engine::DuckDb, &path, &config(1500, 1000), ()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "got {err}");

    let reader = common::open_read_only(Engine::DuckDb, &path);
    assert!(reader.table_exists().unwrap());
    assert_eq!(reader.row_count().unwrap(), 0);
}

#[test]
fn invalid_config_does_not_create_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.duckdb");

    let err = run_load(Engine::DuckDb, &path, &config(1000, 0), ()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(!path.exists());
}

/// Commit every 10 batches of 1000; batch 15 fails. The ten batches of the
/// first group are durable, batches 10..=14 are rolled back.
#[test]
fn failure_mid_group_keeps_only_committed_batches() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "failure.duckdb");
    let store = common::FailingStore::new(common::open_read_write(Engine::DuckDb, &path), 15);

    let mut counter = common::CommitCounter::default();
    let err = LoadOrchestrator::new(store, &config(20_000, 1000))
        .unwrap()
        .run(&mut counter)
        .unwrap_err();

    match err {
        Error::Batch { batch_index, .. } => assert_eq!(batch_index, 15),
        other => panic!("expected a batch error, got {other}"),
    }
    assert_eq!(counter.commits.len(), 1);

    let ids = common::read_duckdb_ids(&path);
    assert_eq!(ids.len(), 10_000);
    assert_eq!(ids.first(), Some(&1));
    assert_eq!(ids.last(), Some(&10_000));
}

#[test]
fn second_run_hits_primary_key() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "rerun.duckdb");
    run_load(Engine::DuckDb, &path, &config(3000, 1000), ()).unwrap();

    let err = run_load(Engine::DuckDb, &path, &config(3000, 1000), ()).unwrap_err();
    assert!(err.is_constraint_violation(), "got {err}");
    match err.root_cause() {
        Error::ConstraintViolation {
            first_id, last_id, ..
        } => {
            assert_eq!(first_id.as_raw(), 1);
            assert_eq!(last_id.as_raw(), 1000);
        }
        other => panic!("unexpected root cause {other}"),
    }

    let reader = common::open_read_only(Engine::DuckDb, &path);
    assert_eq!(reader.row_count().unwrap(), 3000);
}

#[test]
fn schema_initializer_is_idempotent() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "schema.duckdb");
    run_load(Engine::DuckDb, &path, &config(1000, 500), ()).unwrap();

    let mut store = common::open_read_write(Engine::DuckDb, &path);
    salesload::ensure_table_exists(&mut store).unwrap();
    salesload::ensure_table_exists(&mut store).unwrap();
    assert_eq!(store.row_count().unwrap(), 1000);
    salesload::Storage::close(store).unwrap();
}

/// The reference dataset: 200 000 rows, batches of 1000, commit every 10.
#[test]
fn full_default_run_has_no_duplicates() {
    let (_dir, path) = common::create_temp_db_file(Engine::DuckDb, "full.duckdb");
    let cfg = LoadConfig {
        seed: Some(7),
        ..LoadConfig::default()
    };

    let summary = run_load(Engine::DuckDb, &path, &cfg, ()).unwrap();
    assert_eq!(summary.rows_loaded, 200_000);
    assert_eq!(summary.batches, 200);
    assert_eq!(summary.commits, 20);

    let report = salesload::verify_database(
        Engine::DuckDb,
        &path,
        &Verifier::new(cfg.domains.clone()).expect_rows(200_000),
    )
    .unwrap();
    assert_eq!(report.duplicate_count, 0);
    assert!(report.is_clean(), "{:?}", report.mismatches);
    assert_eq!(report.products.len(), 20);
}
