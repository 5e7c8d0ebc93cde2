//! SQLite-backed store.
//!
//! SQLite caps the number of bound parameters per statement, so a large batch
//! is split into several multi-row `INSERT`s. To keep the batch atomic the
//! chunks run inside a `SAVEPOINT` within the outer transaction:
//!
//! ```text
//! BEGIN
//!   SAVEPOINT batch_insert
//!     INSERT ... 5461 rows
//!     INSERT ... 5461 rows
//!     INSERT ... 78 rows     ── fails ──► ROLLBACK TO batch_insert
//!   RELEASE batch_insert
//! COMMIT
//! ```
//!
//! The outer transaction, and every batch already in it, survives a rejected
//! batch until the caller decides to roll back.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags};
use tracing::{debug, warn};

use super::{
    display_path, ranges_from_raw, record_from_columns, ColumnRanges, Engine, ProductStats,
    RawRanges, Storage, TableReader,
};
use crate::error::{Error, Result};
use crate::schema::{self, COLUMN_COUNT, TIMESTAMP_FORMAT};
use crate::types::TransactionRecord;

/// Default `SQLITE_MAX_VARIABLE_NUMBER` of the bundled library.
const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Rows per statement that stay under the parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = MAX_BOUND_PARAMETERS / COLUMN_COUNT;

const SAVEPOINT: &str = "batch_insert";

/// A SQLite connection plus transaction bookkeeping.
pub struct SqliteStore {
    conn: Connection,
    location: String,
    in_txn: bool,
}

impl SqliteStore {
    /// Opens (or creates) a database file for writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = display_path(path.as_ref());
        let conn = Connection::open(path.as_ref()).map_err(|e| Error::Connection {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        // NORMAL: fsync at commit, not per statement. Commits are the durability points.
        conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        debug!(path = %location, "opened sqlite database");
        Ok(Self::from_connection(conn, location))
    }

    /// Opens an existing database file without write access.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let location = display_path(path.as_ref());
        let conn = Connection::open_with_flags(path.as_ref(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::Connection {
                path: location.clone(),
                reason: e.to_string(),
            })?;
        debug!(path = %location, "opened sqlite database read-only");
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

    pub fn location(&self) -> &str {
        &self.location
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_txn {
            self.conn.execute_batch("BEGIN")?;
            self.in_txn = true;
        }
        Ok(())
    }

    fn insert_chunks(&self, records: &[TransactionRecord]) -> Result<()> {
        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = schema::insert_sql(chunk.len());
            let mut stmt = self.conn.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(bind_values(chunk)))?;
        }
        Ok(())
    }
}

fn bind_values(records: &[TransactionRecord]) -> Vec<Value> {
    let mut values = Vec::with_capacity(records.len() * COLUMN_COUNT);
    for r in records {
        values.push(Value::Integer(r.transaction_id.as_raw() as i64));
        values.push(Value::Integer(i64::from(r.user_id)));
        values.push(Value::Text(r.product_name.to_string()));
        values.push(Value::Integer(i64::from(r.quantity)));
        values.push(Value::Real(r.unit_price.as_f64()));
        values.push(Value::Text(
            r.transaction_timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ));
    }
    values
}

fn is_constraint_error(err: &Error) -> bool {
    match err {
        Error::Sqlite(e) => e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation),
        _ => false,
    }
}

impl Storage for SqliteStore {
    fn engine(&self) -> Engine {
        Engine::Sqlite
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
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;

        match self.insert_chunks(records) {
            Ok(()) => {
                self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
                Ok(())
            }
            Err(e) => {
                self.conn.execute_batch(&format!(
                    "ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"
                ))?;
                if is_constraint_error(&e) {
                    Err(Error::ConstraintViolation {
                        first_id: first.transaction_id,
                        last_id: last.transaction_id,
                        reason: e.to_string(),
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute_batch("COMMIT")?;
            self.in_txn = false;
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
        self.conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        debug!(path = %location, "closed sqlite database");
        Ok(())
    }
}

impl TableReader for SqliteStore {
    fn table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [schema::TABLE_NAME],
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
