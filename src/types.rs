//! # Domain Types
//!
//! The row model of the `sales_transactions` table and the transient [`Batch`]
//! that carries rows from the synthesizer to storage.
//!
//! ## Newtypes
//!
//! [`TransactionId`] and [`UnitPrice`] wrap primitives so an id can't be passed
//! where a user id is expected, and so prices stay exact (integer cents) until
//! the moment they are bound to a `DECIMAL(10,2)` column.
//!
//! ## Invariants
//!
//! - [`TransactionId`]: 1-based, never zero
//! - [`Batch`]: ids are contiguous, `[first_id, first_id + len)`

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Transaction Id
// =============================================================================

/// Primary key of a transaction row.
///
/// Assigned by the orchestrator, not by storage: batch `i` of a run with batch
/// size `B` owns ids `[i * B + 1, (i + 1) * B]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// The first id of every run.
    pub const FIRST: Self = Self(1);

    /// Wraps a raw id. Zero is clamped to [`TransactionId::FIRST`].
    pub fn from_raw(raw: u64) -> Self {
        Self(raw.max(1))
    }

    /// Returns the raw id.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns the next id.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the id `n` positions later.
    pub fn add(self, n: u64) -> Self {
        Self(self.0 + n)
    }

    /// First id of the batch at `batch_index` for a run with `batch_size`.
    pub fn batch_start(batch_index: usize, batch_size: usize) -> Self {
        Self(batch_index as u64 * batch_size as u64 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Unit Price
// =============================================================================

/// A price with two fractional digits, stored as integer cents.
///
/// `f64` is only used at the edges: when sampling (the range is continuous)
/// and when binding to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitPrice(u64);

impl UnitPrice {
    /// Builds a price from whole cents.
    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Rounds a decimal amount to the nearest cent.
    ///
    /// Negative and non-finite inputs map to zero.
    pub fn from_f64_rounded(amount: f64) -> Self {
        if !amount.is_finite() || amount <= 0.0 {
            return Self(0);
        }
        Self((amount * 100.0).round() as u64)
    }

    /// Returns the price in cents.
    pub fn cents(self) -> u64 {
        self.0
    }

    /// Returns the price as a decimal amount.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Transaction Record
// =============================================================================

/// One row of `sales_transactions`.
///
/// `product_name` is an `Arc<str>` shared with the synthesizer's catalog, so
/// building a 1000-row batch doesn't allocate 1000 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub user_id: u32,
    pub product_name: Arc<str>,
    pub quantity: u32,
    pub unit_price: UnitPrice,
    pub transaction_timestamp: NaiveDateTime,
}

// =============================================================================
// Batch
// =============================================================================

/// A contiguous block of records inserted in one storage call.
///
/// Batches are constructed, loaded and dropped; they have no identity beyond
/// the run that created them.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<TransactionRecord>,
}

impl Batch {
    /// Wraps records produced by the synthesizer.
    ///
    /// The caller guarantees contiguity; [`Batch::is_contiguous`] checks it.
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Id of the first record, if any.
    pub fn first_id(&self) -> Option<TransactionId> {
        self.records.first().map(|r| r.transaction_id)
    }

    /// Id of the last record, if any.
    pub fn last_id(&self) -> Option<TransactionId> {
        self.records.last().map(|r| r.transaction_id)
    }

    /// Whether ids run `first, first+1, ...` without gaps.
    pub fn is_contiguous(&self) -> bool {
        self.records
            .windows(2)
            .all(|w| w[1].transaction_id == w[0].transaction_id.next())
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: u64) -> TransactionRecord {
        TransactionRecord {
            transaction_id: TransactionId::from_raw(id),
            user_id: 1000,
            product_name: Arc::from("Bamboo Cutting Board"),
            quantity: 1,
            unit_price: UnitPrice::from_cents(99),
            transaction_timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_batch_start_is_one_based() {
        assert_eq!(TransactionId::batch_start(0, 1000).as_raw(), 1);
        assert_eq!(TransactionId::batch_start(1, 1000).as_raw(), 1001);
        assert_eq!(TransactionId::batch_start(199, 1000).as_raw(), 199_001);
    }

    #[test]
    fn test_transaction_id_never_zero() {
        assert_eq!(TransactionId::from_raw(0), TransactionId::FIRST);
    }

    #[test]
    fn test_unit_price_rounding_and_display() {
        assert_eq!(UnitPrice::from_f64_rounded(0.994).cents(), 99);
        assert_eq!(UnitPrice::from_f64_rounded(999.986).to_string(), "999.99");
        assert_eq!(UnitPrice::from_cents(5).to_string(), "0.05");
        assert_eq!(UnitPrice::from_f64_rounded(-3.0).cents(), 0);
        assert_eq!(UnitPrice::from_f64_rounded(f64::NAN).cents(), 0);
    }

    #[test]
    fn test_batch_bounds_and_contiguity() {
        let batch = Batch::new(vec![record(11), record(12), record(13)]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.first_id().map(TransactionId::as_raw), Some(11));
        assert_eq!(batch.last_id().map(TransactionId::as_raw), Some(13));
        assert!(batch.is_contiguous());

        let gappy = Batch::new(vec![record(1), record(3)]);
        assert!(!gappy.is_contiguous());

        let empty = Batch::new(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.first_id(), None);
    }
}
