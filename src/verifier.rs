//! # Verifier
//!
//! Read-only integrity and distribution checks over a loaded table.
//!
//! The verifier never repairs anything. It gathers figures (row count,
//! duplicates, column bounds, per-product shares, a few sample rows) and
//! compares them against the [`ValueDomains`] the data was generated from.
//! Disagreements are listed as [`Mismatch`]es in the report. They are data,
//! not errors: an `Err` from [`Verifier::verify`] means the queries
//! themselves failed.

use std::fmt;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ValueDomains;
use crate::error::Result;
use crate::store::{AnyStore, ColumnRanges, Engine, ProductStats, Storage, TableReader};
use crate::types::TransactionRecord;

/// Rows shown in the report sample.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

// =============================================================================
// Report Types
// =============================================================================

/// A product's share of the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductShare {
    #[serde(flatten)]
    pub stats: ProductStats,
    /// Share of all rows, in percent.
    pub percentage: f64,
}

/// Something the table holds that the generator could not have produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    MissingTable,
    DuplicateIds {
        count: u64,
    },
    RowCount {
        expected: u64,
        actual: u64,
    },
    /// Ids don't cover `[min, max]` exactly once.
    NonContiguousIds {
        min: i64,
        max: i64,
        rows: u64,
    },
    OutOfRange {
        column: String,
        observed: String,
        allowed: String,
    },
    UnknownProduct {
        product_name: String,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingTable => write!(f, "table sales_transactions does not exist"),
            Mismatch::DuplicateIds { count } => {
                write!(f, "{count} duplicate transaction_id values")
            }
            Mismatch::RowCount { expected, actual } => {
                write!(f, "expected {expected} rows, found {actual}")
            }
            Mismatch::NonContiguousIds { min, max, rows } => write!(
                f,
                "transaction_id spans {min}..={max} but the table holds {rows} rows"
            ),
            Mismatch::OutOfRange {
                column,
                observed,
                allowed,
            } => write!(f, "{column} value {observed} outside {allowed}"),
            Mismatch::UnknownProduct { product_name } => {
                write!(f, "product '{product_name}' is not in the catalog")
            }
        }
    }
}

/// Everything the verifier found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub row_count: u64,
    pub duplicate_count: u64,
    pub ranges: Option<ColumnRanges>,
    pub products: Vec<ProductShare>,
    pub sample: Vec<TransactionRecord>,
    pub mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    fn missing_table() -> Self {
        Self {
            row_count: 0,
            duplicate_count: 0,
            ranges: None,
            products: Vec::new(),
            sample: Vec::new(),
            mismatches: vec![Mismatch::MissingTable],
        }
    }

    /// No mismatches.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Configured checks over one table.
#[derive(Debug, Clone)]
pub struct Verifier {
    domains: ValueDomains,
    expected_rows: Option<u64>,
    sample_size: usize,
    now: Option<NaiveDateTime>,
}

impl Verifier {
    pub fn new(domains: ValueDomains) -> Self {
        Self {
            domains,
            expected_rows: None,
            sample_size: DEFAULT_SAMPLE_SIZE,
            now: None,
        }
    }

    /// Also require exactly this many rows.
    pub fn expect_rows(mut self, rows: u64) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    /// Rows to include in the report sample.
    pub fn sample_size(mut self, rows: usize) -> Self {
        self.sample_size = rows;
        self
    }

    /// Timestamps after `now` are out of range. Defaults to the local clock.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Runs every check against `reader`.
    pub fn verify<T: TableReader>(&self, reader: &T) -> Result<VerificationReport> {
        if !reader.table_exists()? {
            warn!("sales_transactions does not exist; nothing to verify");
            return Ok(VerificationReport::missing_table());
        }

        let row_count = reader.row_count()?;
        let duplicate_count = reader.duplicate_count()?;
        let ranges = reader.column_ranges()?;
        let distribution = reader.product_distribution()?;
        let sample = reader.sample_rows(self.sample_size)?;

        let mut mismatches = Vec::new();

        if duplicate_count > 0 {
            mismatches.push(Mismatch::DuplicateIds {
                count: duplicate_count,
            });
        }
        if let Some(expected) = self.expected_rows {
            if expected != row_count {
                mismatches.push(Mismatch::RowCount {
                    expected,
                    actual: row_count,
                });
            }
        }
        if let Some(ranges) = &ranges {
            self.check_ranges(ranges, row_count, &mut mismatches);
        }

        let products: Vec<ProductShare> = distribution
            .into_iter()
            .map(|stats| {
                let percentage = if row_count == 0 {
                    0.0
                } else {
                    stats.sales_count as f64 * 100.0 / row_count as f64
                };
                ProductShare { stats, percentage }
            })
            .collect();

        for share in &products {
            if !self.domains.products.contains(&share.stats.product_name) {
                mismatches.push(Mismatch::UnknownProduct {
                    product_name: share.stats.product_name.clone(),
                });
            }
        }

        info!(
            rows = row_count,
            duplicates = duplicate_count,
            products = products.len(),
            mismatches = mismatches.len(),
            "verification finished"
        );

        Ok(VerificationReport {
            row_count,
            duplicate_count,
            ranges,
            products,
            sample,
            mismatches,
        })
    }

    fn check_ranges(&self, ranges: &ColumnRanges, row_count: u64, out: &mut Vec<Mismatch>) {
        let d = &self.domains;

        let span = (ranges.max_transaction_id - ranges.min_transaction_id + 1).max(0) as u64;
        if ranges.min_transaction_id < 1 || span != row_count {
            out.push(Mismatch::NonContiguousIds {
                min: ranges.min_transaction_id,
                max: ranges.max_transaction_id,
                rows: row_count,
            });
        }

        let int_checks = [
            ("user_id", ranges.min_user_id, d.user_id),
            ("user_id", ranges.max_user_id, d.user_id),
            ("quantity", ranges.min_quantity, d.quantity),
            ("quantity", ranges.max_quantity, d.quantity),
        ];
        for (column, value, range) in int_checks {
            if !range.contains(value) {
                out.push(Mismatch::OutOfRange {
                    column: column.to_string(),
                    observed: value.to_string(),
                    allowed: format!("[{}, {}]", range.min, range.max),
                });
            }
        }

        for value in [ranges.min_unit_price, ranges.max_unit_price] {
            if !d.unit_price.contains(value) {
                out.push(Mismatch::OutOfRange {
                    column: "unit_price".to_string(),
                    observed: format!("{value:.2}"),
                    allowed: format!(
                        "[{}, {}]",
                        d.unit_price.min_price(),
                        d.unit_price.max_price()
                    ),
                });
            }
        }

        let now = self.now.unwrap_or_else(|| Local::now().naive_local());
        if ranges.latest_timestamp > now {
            out.push(Mismatch::OutOfRange {
                column: "transaction_timestamp".to_string(),
                observed: ranges.latest_timestamp.to_string(),
                allowed: format!("not after {}", now.format("%Y-%m-%d %H:%M:%S")),
            });
        }
    }
}

/// Opens `path` read-only, runs `verifier`, and closes the handle.
pub fn verify_database(
    engine: Engine,
    path: impl AsRef<Path>,
    verifier: &Verifier,
) -> Result<VerificationReport> {
    let store = AnyStore::open_read_only(engine, path)?;
    let report = verifier.verify(&store);
    store.close()?;
    report
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DuckDbStore;
    use crate::synthesizer::RowSynthesizer;
    use crate::types::{TransactionId, UnitPrice};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn loaded_store(rows: usize) -> DuckDbStore {
        let mut store = DuckDbStore::open_in_memory().unwrap();
        store.ensure_table().unwrap();
        let batch = RowSynthesizer::seeded(&ValueDomains::default(), Some(11))
            .unwrap()
            .with_anchor(now())
            .generate_batch(TransactionId::FIRST, rows);
        store.execute_bulk_insert(batch.records()).unwrap();
        store.commit().unwrap();
        store
    }

    #[test]
    fn test_clean_table_has_no_mismatches() {
        let store = loaded_store(2000);
        let report = Verifier::new(ValueDomains::default())
            .expect_rows(2000)
            .with_now(now())
            .verify(&store)
            .unwrap();

        assert!(report.is_clean(), "{:?}", report.mismatches);
        assert_eq!(report.row_count, 2000);
        assert_eq!(report.duplicate_count, 0);
        assert_eq!(report.sample.len(), DEFAULT_SAMPLE_SIZE);
        assert_eq!(report.sample[0].transaction_id, TransactionId::FIRST);

        let total: u64 = report.products.iter().map(|p| p.stats.sales_count).sum();
        assert_eq!(total, 2000);
        let percent: f64 = report.products.iter().map(|p| p.percentage).sum();
        assert!((percent - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_domain_rows_are_reported() {
        let mut store = loaded_store(10);
        let mut rogue = loaded_store(1).sample_rows(1).unwrap();
        rogue[0].transaction_id = TransactionId::from_raw(11);
        rogue[0].quantity = 99;
        rogue[0].unit_price = UnitPrice::from_cents(500_000);
        rogue[0].product_name = "Mystery Box".into();
        store.execute_bulk_insert(&rogue).unwrap();
        store.commit().unwrap();

        let report = Verifier::new(ValueDomains::default())
            .expect_rows(10)
            .with_now(now())
            .verify(&store)
            .unwrap();

        assert!(!report.is_clean());
        assert!(report.mismatches.contains(&Mismatch::RowCount {
            expected: 10,
            actual: 11
        }));
        assert!(report.mismatches.iter().any(|m| matches!(
            m,
            Mismatch::OutOfRange { column, .. } if column == "quantity"
        )));
        assert!(report.mismatches.iter().any(|m| matches!(
            m,
            Mismatch::OutOfRange { column, .. } if column == "unit_price"
        )));
        assert!(report.mismatches.contains(&Mismatch::UnknownProduct {
            product_name: "Mystery Box".to_string()
        }));
    }

    #[test]
    fn test_gap_in_ids_is_reported() {
        let mut store = loaded_store(10);
        let mut stray = loaded_store(1).sample_rows(1).unwrap();
        stray[0].transaction_id = TransactionId::from_raw(20);
        store.execute_bulk_insert(&stray).unwrap();
        store.commit().unwrap();

        let report = Verifier::new(ValueDomains::default())
            .with_now(now())
            .verify(&store)
            .unwrap();

        assert_eq!(
            report.mismatches,
            vec![Mismatch::NonContiguousIds {
                min: 1,
                max: 20,
                rows: 11
            }]
        );
    }

    #[test]
    fn test_timestamps_after_now_are_reported() {
        let store = loaded_store(10);
        let before_window = now()
            - chrono::Duration::days(i64::from(crate::config::DEFAULT_LOOKBACK_DAYS) + 1);

        let report = Verifier::new(ValueDomains::default())
            .with_now(before_window)
            .verify(&store)
            .unwrap();

        assert_eq!(report.mismatches.len(), 1);
        assert!(matches!(
            &report.mismatches[0],
            Mismatch::OutOfRange { column, .. } if column == "transaction_timestamp"
        ));
    }

    #[test]
    fn test_sample_size_limits_sample() {
        let store = loaded_store(10);
        let report = Verifier::new(ValueDomains::default())
            .sample_size(3)
            .with_now(now())
            .verify(&store)
            .unwrap();
        assert_eq!(report.sample.len(), 3);
        assert_eq!(report.sample[2].transaction_id.as_raw(), 3);
    }

    #[test]
    fn test_missing_table_is_a_mismatch() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let report = Verifier::new(ValueDomains::default()).verify(&store).unwrap();
        assert_eq!(report.mismatches, vec![Mismatch::MissingTable]);
    }

    #[test]
    fn test_report_serializes() {
        let store = loaded_store(10);
        let report = Verifier::new(ValueDomains::default())
            .with_now(now())
            .verify(&store)
            .unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"duplicate_count\": 0"));
        assert!(json.contains("\"percentage\""));
    }
}
