//! # Table Schema
//!
//! The single table the loader owns, and the SQL text every engine shares.
//!
//! ```text
//! sales_transactions
//! ┌───────────────────────┬───────────────┬──────────────────────────────┐
//! │ transaction_id        │ INTEGER PK    │ 1-based, assigned per batch  │
//! │ user_id               │ INTEGER       │ uniform in [1000, 9999]      │
//! │ product_name          │ VARCHAR       │ uniform over the catalog     │
//! │ quantity              │ INTEGER       │ uniform in [1, 20]           │
//! │ unit_price            │ DECIMAL(10,2) │ uniform in [0.99, 999.99]    │
//! │ transaction_timestamp │ TIMESTAMP     │ within the lookback window   │
//! └───────────────────────┴───────────────┴──────────────────────────────┘
//! ```
//!
//! The DDL and the queries below are plain enough for both DuckDB and SQLite.
//! Reads cast prices to `DOUBLE` and timestamps to `VARCHAR` so both engines
//! hand back the same Rust types.

use tracing::info;

use crate::error::Result;
use crate::store::Storage;

/// Name of the loaded table.
pub const TABLE_NAME: &str = "sales_transactions";

/// Columns in insert order.
pub const COLUMNS: [&str; 6] = [
    "transaction_id",
    "user_id",
    "product_name",
    "quantity",
    "unit_price",
    "transaction_timestamp",
];

/// Bound parameters per inserted row.
pub const COLUMN_COUNT: usize = COLUMNS.len();

/// Idempotent DDL for the table.
pub const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS sales_transactions (
        transaction_id INTEGER PRIMARY KEY,
        user_id INTEGER,
        product_name VARCHAR,
        quantity INTEGER,
        unit_price DECIMAL(10,2),
        transaction_timestamp TIMESTAMP
    )
";

/// Timestamp text format used for binding and for reading back.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepts the optional fractional seconds some engines print.
pub const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// =============================================================================
// Read Queries
// =============================================================================

pub(crate) const ROW_COUNT: &str = "SELECT COUNT(*) FROM sales_transactions";

pub(crate) const DUPLICATE_COUNT: &str =
    "SELECT COUNT(*) - COUNT(DISTINCT transaction_id) FROM sales_transactions";

/// Bounds and averages over every column. All aggregates are NULL on an
/// empty table except the distinct count.
pub(crate) const COLUMN_RANGES: &str = "
    SELECT
        CAST(MIN(transaction_id) AS BIGINT),
        CAST(MAX(transaction_id) AS BIGINT),
        CAST(MIN(user_id) AS BIGINT),
        CAST(MAX(user_id) AS BIGINT),
        CAST(MIN(quantity) AS BIGINT),
        CAST(MAX(quantity) AS BIGINT),
        CAST(MIN(unit_price) AS DOUBLE),
        CAST(MAX(unit_price) AS DOUBLE),
        CAST(MIN(transaction_timestamp) AS VARCHAR),
        CAST(MAX(transaction_timestamp) AS VARCHAR),
        CAST(AVG(quantity) AS DOUBLE),
        CAST(AVG(unit_price) AS DOUBLE),
        COUNT(DISTINCT product_name)
    FROM sales_transactions
";

pub(crate) const PRODUCT_DISTRIBUTION: &str = "
    SELECT
        product_name,
        COUNT(*) AS sales_count,
        CAST(AVG(quantity) AS DOUBLE),
        CAST(AVG(unit_price) AS DOUBLE)
    FROM sales_transactions
    GROUP BY product_name
    ORDER BY sales_count DESC, product_name
";

/// First `limit` rows by id.
pub(crate) fn sample_rows_sql(limit: usize) -> String {
    format!(
        "SELECT
            CAST(transaction_id AS BIGINT),
            CAST(user_id AS BIGINT),
            product_name,
            CAST(quantity AS BIGINT),
            CAST(unit_price AS DOUBLE),
            CAST(transaction_timestamp AS VARCHAR)
        FROM sales_transactions
        ORDER BY transaction_id
        LIMIT {limit}"
    )
}

// =============================================================================
// Insert Statement
// =============================================================================

/// Builds a multi-row insert with one placeholder group per row.
///
/// Only placeholders are generated here; values are always bound.
pub fn insert_sql(rows: usize) -> String {
    const GROUP: &str = "(?, ?, ?, ?, ?, ?)";

    let mut sql = String::with_capacity(80 + rows * (GROUP.len() + 2));
    sql.push_str("INSERT INTO ");
    sql.push_str(TABLE_NAME);
    sql.push_str(" (");
    sql.push_str(&COLUMNS.join(", "));
    sql.push_str(") VALUES ");
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(GROUP);
    }
    sql
}

// =============================================================================
// Initializer
// =============================================================================

/// Creates the table if it does not already exist.
///
/// Safe to call any number of times; never touches existing rows.
pub fn ensure_table_exists<S: Storage>(store: &mut S) -> Result<()> {
    store.ensure_table()?;
    info!(table = TABLE_NAME, engine = %store.engine(), "table ready");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
