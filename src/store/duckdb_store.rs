//! DuckDB-backed store.
//!
//! A batch is one multi-row `INSERT` statement, so DuckDB's statement-level
//! atomicity is the batch atomicity: a rejected batch leaves no rows behind.
//! After a failed statement DuckDB marks the open transaction as aborted; the
//! caller is expected to [`rollback`](Storage::rollback) before doing anything
//! else.
//!
//! DuckDB holds an exclusive lock on a database file. Within one process a
//! file can't be open read-write and read-only at the same time, so close the
//! loader's handle before verifying.

use std::path::Path;

use duckdb::types::Value;
use duckdb::{params_from_iter, AccessMode, Config, Connection};
use tracing::{debug, warn};

use super::{
    display_path, ranges_from_raw, record_from_columns, ColumnRanges, Engine, ProductStats,
    RawRanges, Storage, TableReader,
};
use crate::error::{Error, Result};
use crate::schema::{self, COLUMN_COUNT, TIMESTAMP_FORMAT};
use crate::types::TransactionRecord;

/// A DuckDB connection plus transaction bookkeeping.
pub struct DuckDbStore {
    conn: Connection,
    location: String,
    /// Whether an explicit transaction is open.
    in_txn: bool,
}

impl DuckDbStore {
    /// Opens (or creates) a database file for writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = display_path(path.as_ref());
        let conn = Connection::open(path.as_ref()).map_err(|e| Error::Connection {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %location, "opened duckdb database");
        Ok(Self::from_connection(conn, location))
    }

    /// Opens an existing database file without write access.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let location = display_path(path.as_ref());
        let connection_error = |e: duckdb::Error| Error::Connection {
            path: location.clone(),
            reason: e.to_string(),
        };

        if !path.as_ref().exists() {
            return Err(Error::Connection {
                path: location.clone(),
                reason: "database file does not exist".to_string(),
            });
        }

        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .map_err(connection_error)?;
        let conn = Connection::open_with_flags(path.as_ref(), config).map_err(connection_error)?;
        debug!(path = %location, "opened duckdb database read-only");
        Ok(Self::from_connection(conn, location))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Connection {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_connection(conn, ":memory:".to_string()))
    }

    fn from_connection(conn: Connection, location: String) -> Self {
        Self {
            conn,
            location,
            in_txn: false,
        }
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_txn {
            self.conn.execute_batch("BEGIN TRANSACTION")?;
            self.in_txn = true;
        }
        Ok(())
    }
}

/// Positional parameters for `records`, row-major in [`schema::COLUMNS`] order.
fn bind_values(records: &[TransactionRecord]) -> Vec<Value> {
    let mut values = Vec::with_capacity(records.len() * COLUMN_COUNT);
    for r in records {
        values.push(Value::BigInt(r.transaction_id.as_raw() as i64));
        values.push(Value::BigInt(i64::from(r.user_id)));
        values.push(Value::Text(r.product_name.to_string()));
        values.push(Value::BigInt(i64::from(r.quantity)));
        values.push(Value::Double(r.unit_price.as_f64()));
        values.push(Value::Text(
            r.transaction_timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ));
    }
    values
}

fn is_constraint_error(err: &duckdb::Error) -> bool {
    err.to_string().to_ascii_lowercase().contains("constraint")
}

impl Storage for DuckDbStore {
    fn engine(&self) -> Engine {
        Engine::DuckDb
    }

    fn ensure_table(&mut self) -> Result<()> {
        self.conn.execute_batch(schema::CREATE_TABLE)?;
        Ok(())
    }

    fn execute_bulk_insert(&mut self, records: &[TransactionRecord]) -> Result<()> {
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Err(Error::Configuration(
                "refusing to insert an empty batch".to_string(),
            ));
        };

        self.begin_if_needed()?;

        let sql = schema::insert_sql(records.len());
        let mut stmt = self.conn.prepare_cached(&sql)?;
        match stmt.execute(params_from_iter(bind_values(records))) {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_error(&e) => Err(Error::ConstraintViolation {
                first_id: first.transaction_id,
                last_id: last.transaction_id,
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_txn {
            // The transaction is over either way; a failed COMMIT aborts it.
            self.in_txn = false;
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_txn {
            self.in_txn = false;
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        if self.in_txn {
            warn!(path = %self.location, "closing with uncommitted inserts; rolling back");
            self.rollback()?;
        }
        let location = self.location;
        self.conn.close().map_err(|(_, e)| Error::DuckDb(e))?;
        debug!(path = %location, "closed duckdb database");
        Ok(())
    }
}

impl TableReader for DuckDbStore {
    fn table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            duckdb::params![schema::TABLE_NAME],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn row_count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(schema::ROW_COUNT, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn duplicate_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(schema::DUPLICATE_COUNT, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn column_ranges(&self) -> Result<Option<ColumnRanges>> {
        let raw: RawRanges = self.conn.query_row(schema::COLUMN_RANGES, [], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ))
        })?;
        ranges_from_raw(raw)
    }

    fn product_distribution(&self) -> Result<Vec<ProductStats>> {
        let mut stmt = self.conn.prepare(schema::PRODUCT_DISTRIBUTION)?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok(ProductStats {
                product_name: row.get(0)?,
                sales_count: count.max(0) as u64,
                avg_quantity: row.get(2)?,
                avg_unit_price: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn sample_rows(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(&schema::sample_rows_sql(limit))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, user, product, qty, price, ts) = row?;
            records.push(record_from_columns(id, user, product, qty, price, &ts)?);
        }
        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueDomains;
    use crate::synthesizer::RowSynthesizer;
    use crate::types::TransactionId;

    fn batch(start: u64, len: usize) -> Vec<TransactionRecord> {
        RowSynthesizer::seeded(&ValueDomains::default(), Some(start))
            .expect("valid domains")
            .generate_batch(TransactionId::from_raw(start), len)
            .into_records()
    }

    fn store() -> DuckDbStore {
        let mut store = DuckDbStore::open_in_memory().expect("should open");
        store.ensure_table().expect("should create table");
        store
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let mut store = store();
        store.ensure_table().expect("second create should be a no-op");
        assert!(store.table_exists().unwrap());
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_commit_and_read_back() {
        let mut store = store();
        let records = batch(1, 100);

        store.execute_bulk_insert(&records).expect("insert");
        store.commit().expect("commit");

        assert_eq!(store.row_count().unwrap(), 100);
        assert_eq!(store.duplicate_count().unwrap(), 0);

        let ranges = store.column_ranges().unwrap().expect("non-empty table");
        assert_eq!(ranges.min_transaction_id, 1);
        assert_eq!(ranges.max_transaction_id, 100);

        let sample = store.sample_rows(5).unwrap();
        assert_eq!(sample.len(), 5);
        assert_eq!(sample[0], records[0]);
        assert_eq!(sample[4], records[4]);
    }

    #[test]
    fn test_rollback_discards_uncommitted_batch() {
        let mut store = store();
        store.execute_bulk_insert(&batch(1, 10)).unwrap();
        store.commit().unwrap();
        store.execute_bulk_insert(&batch(11, 10)).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.row_count().unwrap(), 10);
    }

    #[test]
    fn test_duplicate_ids_are_constraint_violations() {
        let mut store = store();
        store.execute_bulk_insert(&batch(1, 10)).unwrap();
        store.commit().unwrap();

        let err = store.execute_bulk_insert(&batch(5, 10)).unwrap_err();
        match err {
            Error::ConstraintViolation {
                first_id, last_id, ..
            } => {
                assert_eq!(first_id.as_raw(), 5);
                assert_eq!(last_id.as_raw(), 14);
            }
            other => panic!("expected constraint violation, got {other}"),
        }

        store.rollback().unwrap();
        assert_eq!(store.row_count().unwrap(), 10);
    }

    #[test]
    fn test_empty_insert_rejected() {
        let mut store = store();
        assert!(matches!(
            store.execute_bulk_insert(&[]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_table_has_no_ranges() {
        let store = store();
        assert_eq!(store.column_ranges().unwrap(), None);
        assert!(store.product_distribution().unwrap().is_empty());
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/test.duckdb");
        assert!(matches!(
            DuckDbStore::open(&path),
            Err(Error::Connection { .. })
        ));
        assert!(matches!(
            DuckDbStore::open_read_only(&path),
            Err(Error::Connection { .. })
        ));
    }

    #[test]
    fn test_read_only_reopen_sees_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.duckdb");

        let mut store = DuckDbStore::open(&path).unwrap();
        store.ensure_table().unwrap();
        store.execute_bulk_insert(&batch(1, 50)).unwrap();
        store.commit().unwrap();
        store.close().unwrap();

        let reader = DuckDbStore::open_read_only(&path).unwrap();
        assert_eq!(reader.row_count().unwrap(), 50);
        let per_product: u64 = reader
            .product_distribution()
            .unwrap()
            .iter()
            .map(|p| p.sales_count)
            .sum();
        assert_eq!(per_product, 50);
    }
}
