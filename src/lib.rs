//! # salesload - Synthetic Sales Data Loader
//!
//! salesload populates and validates a single analytical table,
//! `sales_transactions`, inside an embedded database. It:
//!
//! - **Creates the schema**: one idempotent `CREATE TABLE IF NOT EXISTS`
//! - **Synthesizes rows**: uniform random users, products, quantities, prices
//!   and timestamps, with contiguous 1-based ids
//! - **Bulk loads in batches**: one parameterized insert per batch, with a
//!   commit every N batches
//! - **Verifies the result**: duplicates, value ranges, product distribution
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Load Orchestrator                          │
//! │        (batch sequencing, commit policy, progress, abort)       │
//! └───────┬─────────────────────┬───────────────────────┬───────────┘
//!         │                     │                       │
//!         ▼                     ▼                       ▼
//! ┌───────────────┐    ┌────────────────┐     ┌───────────────────┐
//! │ Row           │    │ Batch Loader   │     │ LoadObserver      │
//! │ Synthesizer   │───►│ (bulk insert)  │     │ (log / bar / none)│
//! └───────────────┘    └───────┬────────┘     └───────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Storage: DuckDB (default) or SQLite                  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ read-only
//!                               ▼
//!                      ┌─────────────────┐
//!                      │    Verifier     │
//!                      └─────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Ids**: batch `i` holds ids `[i * B + 1, (i + 1) * B]`; a full run
//!    holds exactly `[1, total_rows]`
//! 2. **Domains**: every generated field lies in its closed domain
//! 3. **Batch atomicity**: a batch is either fully inserted or absent
//! 4. **Commit boundary**: an aborted run keeps exactly the committed batches
//!
//! ## Example
//!
//! ```rust,no_run
//! use salesload::{run_load, Engine, LoadConfig, LogProgress};
//!
//! let config = LoadConfig::with_rows(20_000, 1_000);
//! let summary = run_load(Engine::DuckDb, "sales.duckdb", &config, LogProgress::default())?;
//! assert_eq!(summary.rows_loaded, 20_000);
//! # Ok::<(), salesload::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for every failure mode of the pipeline.
pub mod error;

/// Domain types: ids, prices, records and batches.
pub mod types;

/// Run configuration, value domains, commit and remainder policies.
pub mod config;

/// Table DDL and the SQL shared by the engines.
pub mod schema;

/// Storage traits and the DuckDB / SQLite engines.
///
/// The write side is [`store::Storage`], the read side
/// [`store::TableReader`]. [`store::AnyStore`] chooses an engine at runtime.
pub mod store;

/// Deterministic (given a seed) row generation.
pub mod synthesizer;

/// One bulk insert per batch.
pub mod bulk;

/// Progress callbacks.
pub mod observer;

/// Batch sequencing, commit cadence and failure handling.
///
/// The main entry points are [`orchestrator::LoadOrchestrator`] and
/// [`orchestrator::run_load`].
pub mod orchestrator;

/// Read-only integrity and distribution checks.
pub mod verifier;

/// psql-style text tables for verification reports.
pub mod report;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    CommitAlignment, CommitPolicy, LoadConfig, RemainderPolicy, ValueDomains,
};
pub use error::{Error, Result};
pub use observer::{BarProgress, CommitEvent, LoadObserver, LogProgress};
pub use orchestrator::{run_load, LoadOrchestrator, LoadSummary, RunPhase};
pub use schema::ensure_table_exists;
pub use store::{AnyStore, DuckDbStore, Engine, SqliteStore, Storage, TableReader};
pub use synthesizer::RowSynthesizer;
pub use types::{Batch, TransactionId, TransactionRecord, UnitPrice};
pub use verifier::{verify_database, Mismatch, VerificationReport, Verifier};
