#![allow(dead_code)]

use std::path::{Path, PathBuf};

use salesload::{
    ensure_table_exists, AnyStore, CommitEvent, Engine, Error, LoadObserver, Result, Storage,
    TransactionRecord,
};

pub fn create_temp_db_file(engine: Engine, name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let mut store = AnyStore::open(engine, &path).expect("open database");
    ensure_table_exists(&mut store).expect("create table");
    store.close().expect("close database");
    (dir, path)
}

pub fn open_read_write(engine: Engine, path: &Path) -> AnyStore {
    AnyStore::open(engine, path).expect("open read-write store")
}

pub fn open_read_only(engine: Engine, path: &Path) -> AnyStore {
    AnyStore::open_read_only(engine, path).expect("open read-only store")
}

/// Every `transaction_id` in a DuckDB file, ascending.
pub fn read_duckdb_ids(path: &Path) -> Vec<i64> {
    let conn = duckdb::Connection::open(path).expect("open duckdb");
    let mut stmt = conn
        .prepare("SELECT CAST(transaction_id AS BIGINT) FROM sales_transactions ORDER BY 1")
        .expect("prepare");
    let ids = stmt
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<std::result::Result<Vec<i64>, _>>()
        .expect("collect");
    ids
}

/// Wraps a store and fails the bulk insert with the given zero-based index.
pub struct FailingStore {
    inner: AnyStore,
    inserts: usize,
    fail_at: usize,
}

impl FailingStore {
    pub fn new(inner: AnyStore, fail_at: usize) -> Self {
        Self {
            inner,
            inserts: 0,
            fail_at,
        }
    }
}

impl Storage for FailingStore {
    fn engine(&self) -> Engine {
        self.inner.engine()
    }

    fn ensure_table(&mut self) -> Result<()> {
        self.inner.ensure_table()
    }

    fn execute_bulk_insert(&mut self, records: &[TransactionRecord]) -> Result<()> {
        let index = self.inserts;
        self.inserts += 1;
        if index == self.fail_at {
            return Err(Error::Configuration(format!(
                "simulated storage failure at insert {index}"
            )));
        }
        self.inner.execute_bulk_insert(records)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }

    fn close(self) -> Result<()> {
        self.inner.close()
    }
}

/// Collects commit events and the final progress report.
#[derive(Default)]
pub struct CommitCounter {
    pub commits: Vec<CommitEvent>,
    pub last_report: Option<(usize, usize)>,
}

impl LoadObserver for CommitCounter {
    fn report(&mut self, current: usize, total: usize) {
        self.last_report = Some((current, total));
    }

    fn committed(&mut self, event: &CommitEvent) {
        self.commits.push(*event);
    }
}
