//! # Load Configuration
//!
//! Everything that shapes a run lives in [`LoadConfig`]: how many rows, how
//! big each batch is, when to commit, what to do with a remainder, and the
//! value domains the synthesizer samples from. Defaults reproduce the
//! reference dataset (200 000 rows, batches of 1000, commit every 10 batches);
//! tests build small configs instead.
//!
//! A config can be loaded from JSON. Missing fields fall back to defaults:
//!
//! ```json
//! { "total_rows": 5000, "batch_size": 500, "seed": 42,
//!   "commit": { "interval": 4, "alignment": "group_end" } }
//! ```
//!
//! ## Validation
//!
//! [`LoadConfig::plan`] validates the whole config and turns it into a
//! [`BatchPlan`]. It is the single gate every run passes through before the
//! first row is generated, so a bad config never leaves partial work behind.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{TransactionId, UnitPrice};

// =============================================================================
// Defaults
// =============================================================================

/// Default number of rows per run.
pub const DEFAULT_TOTAL_ROWS: u64 = 200_000;

/// Default rows per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Default number of batches between commits.
///
/// Bounds uncommitted work (and what a failure can lose) to this many batches.
pub const DEFAULT_COMMIT_INTERVAL: usize = 10;

/// Default timestamp lookback: three 365-day years.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365 * 3;

/// Longest accepted lookback window, about a thousand years.
pub const MAX_LOOKBACK_DAYS: u32 = 365_250;

/// Largest accepted batch. A batch is one statement with six bound
/// parameters per row.
pub const MAX_BATCH_SIZE: usize = 100_000;

/// `transaction_id` is an `INTEGER` (32-bit) column.
pub const MAX_TRANSACTION_ID: u64 = i32::MAX as u64;

/// Largest value a `DECIMAL(10,2)` column holds, in cents.
pub const MAX_PRICE_CENTS: u64 = 9_999_999_999;

/// The default product catalog.
pub const DEFAULT_PRODUCTS: [&str; 20] = [
    "Premium Wireless Headphones",
    "Ergonomic Office Chair",
    "Ultra HD Smart TV 55\"",
    "Ceramic Coffee Mug Set",
    "Professional Chef Knife",
    "Organic Cotton T-Shirt",
    "Fitness Tracking Watch",
    "Bluetooth Portable Speaker",
    "Memory Foam Mattress",
    "Stainless Steel Water Bottle",
    "Robot Vacuum Cleaner",
    "Solar Power Bank",
    "Leather Wallet Slim",
    "Noise Cancelling Earbuds",
    "Professional DSLR Camera",
    "Smart Home Security System",
    "Adjustable Dumbbell Set",
    "Bamboo Cutting Board",
    "Cast Iron Skillet Set",
    "Air Purifier HEPA Filter",
];

// =============================================================================
// Value Domains
// =============================================================================

/// A closed integer range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

impl IntRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= i64::from(self.min) && value <= i64::from(self.max)
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::Configuration(format!(
                "{field} range is empty: min {} > max {}",
                self.min, self.max
            )));
        }
        if i64::from(self.max) > i64::from(i32::MAX) {
            return Err(Error::Configuration(format!(
                "{field} max {} does not fit an INTEGER column",
                self.max
            )));
        }
        Ok(())
    }
}

/// A closed price range in currency units, e.g. `[0.99, 999.99]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Lower bound rounded to cents.
    pub fn min_price(&self) -> UnitPrice {
        UnitPrice::from_f64_rounded(self.min)
    }

    /// Upper bound rounded to cents.
    pub fn max_price(&self) -> UnitPrice {
        UnitPrice::from_f64_rounded(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        let cents = UnitPrice::from_f64_rounded(value);
        value >= 0.0 && cents >= self.min_price() && cents <= self.max_price()
    }

    fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::Configuration(
                "unit_price bounds must be finite".to_string(),
            ));
        }
        if self.min < 0.0 {
            return Err(Error::Configuration(format!(
                "unit_price min {} is negative",
                self.min
            )));
        }
        if self.min > self.max || self.min_price() > self.max_price() {
            return Err(Error::Configuration(format!(
                "unit_price range is empty: min {} > max {}",
                self.min, self.max
            )));
        }
        if self.max_price().cents() > MAX_PRICE_CENTS {
            return Err(Error::Configuration(format!(
                "unit_price max {} does not fit DECIMAL(10,2)",
                self.max
            )));
        }
        Ok(())
    }
}

/// The domains each synthesized field is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueDomains {
    pub user_id: IntRange,
    pub quantity: IntRange,
    pub unit_price: PriceRange,
    pub products: Vec<String>,
    /// Timestamps are drawn from `[now - lookback_days, now]`.
    pub lookback_days: u32,
}

impl Default for ValueDomains {
    fn default() -> Self {
        Self {
            user_id: IntRange::new(1000, 9999),
            quantity: IntRange::new(1, 20),
            unit_price: PriceRange::new(0.99, 999.99),
            products: DEFAULT_PRODUCTS.iter().map(|p| p.to_string()).collect(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl ValueDomains {
    /// Rejects domains the synthesizer could not sample from.
    pub fn validate(&self) -> Result<()> {
        self.user_id.validate("user_id")?;
        self.quantity.validate("quantity")?;
        self.unit_price.validate()?;

        if self.products.is_empty() {
            return Err(Error::Configuration(
                "product catalog is empty".to_string(),
            ));
        }
        if let Some(blank) = self.products.iter().position(|p| p.trim().is_empty()) {
            return Err(Error::Configuration(format!(
                "product catalog entry {blank} is blank"
            )));
        }
        if self.lookback_days == 0 {
            return Err(Error::Configuration(
                "lookback window must be at least one day".to_string(),
            ));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(Error::Configuration(format!(
                "lookback window of {} days exceeds {MAX_LOOKBACK_DAYS}",
                self.lookback_days
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Commit Policy
// =============================================================================

/// Which batch indices end a commit group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CommitAlignment {
    /// Commit after batch indices `interval-1, 2*interval-1, ...`: every
    /// commit covers a full group of `interval` batches.
    #[default]
    GroupEnd,
    /// Commit after batch indices `0, interval, 2*interval, ...`
    /// (`i % interval == 0`): the first batch is committed on its own.
    FirstBatch,
}

/// How often outstanding writes are flushed during a run.
///
/// Whatever the policy, the orchestrator always commits once more after the
/// last batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitPolicy {
    /// Batches per commit group. Must be at least 1.
    pub interval: usize,
    pub alignment: CommitAlignment,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COMMIT_INTERVAL,
            alignment: CommitAlignment::GroupEnd,
        }
    }
}

impl CommitPolicy {
    pub fn every(interval: usize) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_alignment(mut self, alignment: CommitAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Whether the orchestrator commits right after loading `batch_index`.
    pub fn commits_after(&self, batch_index: usize) -> bool {
        let interval = self.interval.max(1);
        match self.alignment {
            CommitAlignment::GroupEnd => (batch_index + 1) % interval == 0,
            CommitAlignment::FirstBatch => batch_index % interval == 0,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::Configuration(
                "commit interval must be at least 1 batch".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Remainder Policy
// =============================================================================

/// What to do when `total_rows` is not a multiple of `batch_size`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Refuse to run.
    #[default]
    Reject,
    /// Load the remainder as a shorter final batch.
    LoadPartialBatch,
    /// Floor-divide and skip the remainder rows.
    Truncate,
}

// =============================================================================
// Load Config
// =============================================================================

/// Complete description of one load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub total_rows: u64,
    pub batch_size: usize,
    pub commit: CommitPolicy,
    pub remainder: RemainderPolicy,
    pub domains: ValueDomains,
    /// Seed for the row synthesizer. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_rows: DEFAULT_TOTAL_ROWS,
            batch_size: DEFAULT_BATCH_SIZE,
            commit: CommitPolicy::default(),
            remainder: RemainderPolicy::Reject,
            domains: ValueDomains::default(),
            seed: None,
        }
    }
}

impl LoadConfig {
    /// Shorthand for a config with default domains and commit policy.
    pub fn with_rows(total_rows: u64, batch_size: usize) -> Self {
        Self {
            total_rows,
            batch_size,
            ..Self::default()
        }
    }

    /// Parses a JSON config; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates the config and computes the batch layout.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` for a zero or oversized batch, zero rows, an id
    /// range beyond the column type, an invalid commit interval, a malformed
    /// value domain, or a remainder under [`RemainderPolicy::Reject`].
    pub fn plan(&self) -> Result<BatchPlan> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Configuration(format!(
                "batch size {} exceeds the maximum of {MAX_BATCH_SIZE}",
                self.batch_size
            )));
        }
        if self.total_rows == 0 {
            return Err(Error::Configuration(
                "total rows must be at least 1".to_string(),
            ));
        }
        if self.total_rows > MAX_TRANSACTION_ID {
            return Err(Error::Configuration(format!(
                "total rows {} exceeds the id space of {MAX_TRANSACTION_ID}",
                self.total_rows
            )));
        }
        self.commit.validate()?;
        self.domains.validate()?;

        let batch_size = self.batch_size as u64;
        let full_batches = (self.total_rows / batch_size) as usize;
        let remainder = (self.total_rows % batch_size) as usize;

        let plan = match (remainder, self.remainder) {
            (0, _) => BatchPlan::new(self.batch_size, full_batches, self.batch_size),
            (_, RemainderPolicy::Reject) => {
                return Err(Error::Configuration(format!(
                    "total rows {} is not a multiple of batch size {} ({} rows left over)",
                    self.total_rows, self.batch_size, remainder
                )));
            }
            (_, RemainderPolicy::LoadPartialBatch) => {
                BatchPlan::new(self.batch_size, full_batches + 1, remainder)
            }
            (_, RemainderPolicy::Truncate) => {
                if full_batches == 0 {
                    return Err(Error::Configuration(format!(
                        "total rows {} is smaller than one batch of {}; nothing to load",
                        self.total_rows, self.batch_size
                    )));
                }
                BatchPlan::new(self.batch_size, full_batches, self.batch_size)
                    .with_dropped_rows(remainder as u64)
            }
        };

        Ok(plan)
    }
}

// =============================================================================
// Batch Plan
// =============================================================================

/// The validated batch layout of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    batch_size: usize,
    num_batches: usize,
    last_batch_len: usize,
    dropped_rows: u64,
}

impl BatchPlan {
    fn new(batch_size: usize, num_batches: usize, last_batch_len: usize) -> Self {
        Self {
            batch_size,
            num_batches,
            last_batch_len,
            dropped_rows: 0,
        }
    }

    fn with_dropped_rows(mut self, dropped_rows: u64) -> Self {
        self.dropped_rows = dropped_rows;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Rows skipped under [`RemainderPolicy::Truncate`].
    pub fn dropped_rows(&self) -> u64 {
        self.dropped_rows
    }

    /// Rows the plan will actually load.
    pub fn rows_to_load(&self) -> u64 {
        match self.num_batches {
            0 => 0,
            n => (n as u64 - 1) * self.batch_size as u64 + self.last_batch_len as u64,
        }
    }

    /// Number of rows in the batch at `batch_index`.
    pub fn batch_len(&self, batch_index: usize) -> usize {
        if batch_index + 1 == self.num_batches {
            self.last_batch_len
        } else {
            self.batch_size
        }
    }

    /// First id of the batch at `batch_index`.
    pub fn start_id(&self, batch_index: usize) -> TransactionId {
        TransactionId::batch_start(batch_index, self.batch_size)
    }
}

// =============================================================================
// Tests
// =============================================================================
