//! # Storage Handles
//!
//! The loader talks to storage through two traits:
//!
//! - [`Storage`]: the write side (DDL, bulk insert, commit, rollback, close)
//! - [`TableReader`]: the read-only aggregate queries the verifier runs
//!
//! Two engines implement both: [`DuckDbStore`] (the default, an embedded
//! columnar engine) and [`SqliteStore`]. [`AnyStore`] picks one at runtime
//! from an [`Engine`] value so the CLI doesn't need to be generic.
//!
//! ## Transactions
//!
//! Stores start in autocommit mode. The first insert after open (or after a
//! commit) opens an explicit transaction; [`Storage::commit`] ends it. A store
//! never commits on its own.
//!
//! ```text
//!   open ──► insert ──► insert ──► commit ──► insert ──► rollback ──► close
//!            BEGIN                 COMMIT     BEGIN      ROLLBACK
//! ```

mod duckdb_store;
mod sqlite_store;

use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::TransactionRecord;

pub use self::duckdb_store::DuckDbStore;
pub use self::sqlite_store::SqliteStore;

// =============================================================================
// Engine
// =============================================================================

/// Which embedded engine backs a store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    #[value(name = "duckdb")]
    DuckDb,
    #[value(name = "sqlite")]
    Sqlite,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::DuckDb => f.write_str("duckdb"),
            Engine::Sqlite => f.write_str("sqlite"),
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// A live, writable handle on the database holding `sales_transactions`.
pub trait Storage {
    /// The engine behind this handle.
    fn engine(&self) -> Engine;

    /// Creates the table if absent. Idempotent.
    fn ensure_table(&mut self) -> Result<()>;

    /// Inserts every record in one atomic call.
    ///
    /// Either all records land (pending the next commit) or none do. A
    /// primary-key collision is reported as
    /// [`Error::ConstraintViolation`](crate::Error::ConstraintViolation).
    /// `records` must not be empty.
    fn execute_bulk_insert(&mut self, records: &[TransactionRecord]) -> Result<()>;

    /// Makes every insert since the previous commit durable. A no-op when
    /// nothing is pending.
    fn commit(&mut self) -> Result<()>;

    /// Discards every insert since the previous commit. A no-op when nothing
    /// is pending.
    fn rollback(&mut self) -> Result<()>;

    /// Releases the handle. Pending inserts are rolled back by the engine.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Read-only aggregate queries over `sales_transactions`.
pub trait TableReader {
    fn table_exists(&self) -> Result<bool>;

    fn row_count(&self) -> Result<u64>;

    /// `COUNT(*) - COUNT(DISTINCT transaction_id)`.
    fn duplicate_count(&self) -> Result<u64>;

    /// Per-column bounds and averages; `None` on an empty table.
    fn column_ranges(&self) -> Result<Option<ColumnRanges>>;

    /// Per-product counts and averages, most frequent first.
    fn product_distribution(&self) -> Result<Vec<ProductStats>>;

    /// The first `limit` rows by id.
    fn sample_rows(&self, limit: usize) -> Result<Vec<TransactionRecord>>;
}

// =============================================================================
// Read Results
// =============================================================================

/// Observed bounds of every column plus a few averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRanges {
    pub min_transaction_id: i64,
    pub max_transaction_id: i64,
    pub min_user_id: i64,
    pub max_user_id: i64,
    pub min_quantity: i64,
    pub max_quantity: i64,
    pub min_unit_price: f64,
    pub max_unit_price: f64,
    pub earliest_timestamp: NaiveDateTime,
    pub latest_timestamp: NaiveDateTime,
    pub avg_quantity: f64,
    pub avg_unit_price: f64,
    pub distinct_products: u64,
}

/// One row of the product distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub product_name: String,
    pub sales_count: u64,
    pub avg_quantity: f64,
    pub avg_unit_price: f64,
}

/// Raw aggregate row before the empty-table check.
pub(crate) type RawRanges = (
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
    i64,
);

/// Turns the raw `COLUMN_RANGES` row into [`ColumnRanges`]. Any NULL bound
/// means the table is empty.
pub(crate) fn ranges_from_raw(raw: RawRanges) -> Result<Option<ColumnRanges>> {
    let (
        min_id,
        max_id,
        min_user,
        max_user,
        min_qty,
        max_qty,
        min_price,
        max_price,
        earliest,
        latest,
        avg_qty,
        avg_price,
        distinct,
    ) = raw;

    let (
        Some(min_transaction_id),
        Some(max_transaction_id),
        Some(min_user_id),
        Some(max_user_id),
        Some(min_quantity),
        Some(max_quantity),
        Some(min_unit_price),
        Some(max_unit_price),
        Some(earliest),
        Some(latest),
        Some(avg_quantity),
        Some(avg_unit_price),
    ) = (
        min_id, max_id, min_user, max_user, min_qty, max_qty, min_price, max_price, earliest,
        latest, avg_qty, avg_price,
    )
    else {
        return Ok(None);
    };

    Ok(Some(ColumnRanges {
        min_transaction_id,
        max_transaction_id,
        min_user_id,
        max_user_id,
        min_quantity,
        max_quantity,
        min_unit_price,
        max_unit_price,
        earliest_timestamp: parse_timestamp(&earliest)?,
        latest_timestamp: parse_timestamp(&latest)?,
        avg_quantity,
        avg_unit_price,
        distinct_products: distinct.max(0) as u64,
    }))
}

/// Parses a timestamp as either engine prints it.
pub(crate) fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, crate::schema::TIMESTAMP_PARSE_FORMAT).map_err(|e| {
        crate::Error::Decode(format!("timestamp '{text}': {e}"))
    })
}

/// Builds a record from the columns of a sample-row query.
pub(crate) fn record_from_columns(
    transaction_id: i64,
    user_id: i64,
    product_name: String,
    quantity: i64,
    unit_price: f64,
    timestamp: &str,
) -> Result<TransactionRecord> {
    use crate::types::{TransactionId, UnitPrice};

    Ok(TransactionRecord {
        transaction_id: TransactionId::from_raw(transaction_id.max(0) as u64),
        user_id: user_id.clamp(0, i64::from(u32::MAX)) as u32,
        product_name: product_name.into(),
        quantity: quantity.clamp(0, i64::from(u32::MAX)) as u32,
        unit_price: UnitPrice::from_f64_rounded(unit_price),
        transaction_timestamp: parse_timestamp(timestamp)?,
    })
}

/// Renders a path for error messages.
pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}

// =============================================================================
// AnyStore
// =============================================================================

/// A store whose engine is chosen at runtime.
pub enum AnyStore {
    DuckDb(DuckDbStore),
    Sqlite(SqliteStore),
}

impl AnyStore {
    /// Opens (creating if needed) a writable database file.
    pub fn open(engine: Engine, path: impl AsRef<Path>) -> Result<Self> {
        Ok(match engine {
            Engine::DuckDb => AnyStore::DuckDb(DuckDbStore::open(path)?),
            Engine::Sqlite => AnyStore::Sqlite(SqliteStore::open(path)?),
        })
    }

    /// Opens an existing database file for reading only.
    pub fn open_read_only(engine: Engine, path: impl AsRef<Path>) -> Result<Self> {
        Ok(match engine {
            Engine::DuckDb => AnyStore::DuckDb(DuckDbStore::open_read_only(path)?),
            Engine::Sqlite => AnyStore::Sqlite(SqliteStore::open_read_only(path)?),
        })
    }

    /// Opens a throwaway in-memory database.
    pub fn open_in_memory(engine: Engine) -> Result<Self> {
        Ok(match engine {
            Engine::DuckDb => AnyStore::DuckDb(DuckDbStore::open_in_memory()?),
            Engine::Sqlite => AnyStore::Sqlite(SqliteStore::open_in_memory()?),
        })
    }
}

impl Storage for AnyStore {
    fn engine(&self) -> Engine {
        match self {
            AnyStore::DuckDb(s) => s.engine(),
            AnyStore::Sqlite(s) => s.engine(),
        }
    }

    fn ensure_table(&mut self) -> Result<()> {
        match self {
            AnyStore::DuckDb(s) => s.ensure_table(),
            AnyStore::Sqlite(s) => s.ensure_table(),
        }
    }

    fn execute_bulk_insert(&mut self, records: &[TransactionRecord]) -> Result<()> {
        match self {
            AnyStore::DuckDb(s) => s.execute_bulk_insert(records),
            AnyStore::Sqlite(s) => s.execute_bulk_insert(records),
        }
    }

    fn commit(&mut self) -> Result<()> {
        match self {
            AnyStore::DuckDb(s) => s.commit(),
            AnyStore::Sqlite(s) => s.commit(),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match self {
            AnyStore::DuckDb(s) => s.rollback(),
            AnyStore::Sqlite(s) => s.rollback(),
        }
    }

    fn close(self) -> Result<()> {
        match self {
            AnyStore::DuckDb(s) => s.close(),
            AnyStore::Sqlite(s) => s.close(),
        }
    }
}

impl TableReader for AnyStore {
    fn table_exists(&self) -> Result<bool> {
        match self {
            AnyStore::DuckDb(s) => s.table_exists(),
            AnyStore::Sqlite(s) => s.table_exists(),
        }
    }

    fn row_count(&self) -> Result<u64> {
        match self {
            AnyStore::DuckDb(s) => s.row_count(),
            AnyStore::Sqlite(s) => s.row_count(),
        }
    }

    fn duplicate_count(&self) -> Result<u64> {
        match self {
            AnyStore::DuckDb(s) => s.duplicate_count(),
            AnyStore::Sqlite(s) => s.duplicate_count(),
        }
    }

    fn column_ranges(&self) -> Result<Option<ColumnRanges>> {
        match self {
            AnyStore::DuckDb(s) => s.column_ranges(),
            AnyStore::Sqlite(s) => s.column_ranges(),
        }
    }

    fn product_distribution(&self) -> Result<Vec<ProductStats>> {
        match self {
            AnyStore::DuckDb(s) => s.product_distribution(),
            AnyStore::Sqlite(s) => s.product_distribution(),
        }
    }

    fn sample_rows(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        match self {
            AnyStore::DuckDb(s) => s.sample_rows(limit),
            AnyStore::Sqlite(s) => s.sample_rows(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ranges_are_none() {
        let raw: RawRanges = (
            None, None, None, None, None, None, None, None, None, None, None, None, 0,
        );
        assert_eq!(ranges_from_raw(raw).unwrap(), None);
    }

    #[test]
    fn test_parse_timestamp_with_and_without_fraction() {
        let a = parse_timestamp("2024-02-29 23:59:59").unwrap();
        let b = parse_timestamp("2024-02-29 23:59:59.000").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_in_memory_stores_behave_alike() {
        let record = TransactionRecord {
            transaction_id: crate::types::TransactionId::FIRST,
            user_id: 1234,
            product_name: "Laptop".into(),
            quantity: 2,
            unit_price: crate::types::UnitPrice::from_cents(99_999),
            transaction_timestamp: parse_timestamp("2024-05-01 08:30:00").unwrap(),
        };

        for engine in [Engine::DuckDb, Engine::Sqlite] {
            let mut store = AnyStore::open_in_memory(engine).unwrap();
            assert_eq!(store.engine(), engine);
            assert!(!store.table_exists().unwrap());

            store.ensure_table().unwrap();
            store.execute_bulk_insert(std::slice::from_ref(&record)).unwrap();
            store.commit().unwrap();

            assert_eq!(store.row_count().unwrap(), 1);
            assert_eq!(store.sample_rows(5).unwrap(), vec![record.clone()]);
            store.close().unwrap();
        }
    }

    #[test]
    fn test_engine_display() {
        assert_eq!(Engine::DuckDb.to_string(), "duckdb");
        assert_eq!(Engine::Sqlite.to_string(), "sqlite");
        assert_eq!(Engine::default(), Engine::DuckDb);
    }
}
