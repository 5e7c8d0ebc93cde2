//! # Error Handling for salesload
//!
//! A single error enum ([`Error`]) covers every failure mode of the load
//! pipeline, so callers can match on one type whether a run failed while
//! validating its configuration, opening the database, or inserting batch 147.
//!
//! ## Error Categories
//!
//! | Category | Variants | Typical Response |
//! |----------|----------|------------------|
//! | Configuration | `Configuration` | Fix parameters, nothing was written |
//! | Connection | `Connection` | Check the path / file lock, rerun |
//! | Constraint | `ConstraintViolation` | Table already holds these ids |
//! | Decode | `Decode` | Table was written by something else |
//! | Run context | `Batch`, `Commit` | Inspect the wrapped cause |
//! | Engine | `DuckDb`, `Sqlite` | Log and investigate |
//!
//! Verification mismatches are deliberately *not* errors: the verifier reports
//! them as data in its [`VerificationReport`](crate::verifier::VerificationReport).

use thiserror::Error;

use crate::types::TransactionId;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur while creating, loading or verifying the table.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration (detected before any row is generated)
    // =========================================================================

    /// Invalid generation parameters.
    ///
    /// Raised by [`LoadConfig::plan`](crate::config::LoadConfig::plan) and by
    /// [`RowSynthesizer::new`](crate::synthesizer::RowSynthesizer::new), i.e.
    /// always before the first insert. When you see this error the table has
    /// not been touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================

    /// The storage handle could not be acquired.
    ///
    /// Typical causes: the parent directory does not exist, another process
    /// holds the DuckDB write lock, or a read-only open targets a missing file.
    #[error("cannot open database '{path}': {reason}")]
    Connection {
        /// Path (or `:memory:`) that was being opened
        path: String,
        /// Engine-level message
        reason: String,
    },

    /// A bulk insert collided with the primary key on `transaction_id`.
    ///
    /// Correct sequencing makes this impossible within one run against an
    /// empty table; in practice it means the table already holds rows from an
    /// earlier run. The id range identifies the rejected batch.
    #[error(
        "constraint violation inserting transaction ids {first_id}..={last_id}: {reason}"
    )]
    ConstraintViolation {
        /// First id of the rejected batch
        first_id: TransactionId,
        /// Last id of the rejected batch
        last_id: TransactionId,
        /// Engine-level message
        reason: String,
    },

    /// A value read back from the table could not be decoded.
    #[error("unreadable value in table: {0}")]
    Decode(String),

    // =========================================================================
    // Run Context
    // =========================================================================

    /// A batch could not be synthesized or inserted; the run was aborted.
    #[error("batch {batch_index} failed: {source}")]
    Batch {
        /// Zero-based index of the failing batch
        batch_index: usize,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A flush point failed; uncommitted work since the previous commit is lost.
    #[error("commit after batch {after_batch} failed: {source}")]
    Commit {
        /// Zero-based index of the last batch included in the failed commit
        after_batch: usize,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Wrapped Library Errors
    // =========================================================================

    /// DuckDB operation failed.
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Reading a config file or writing a report failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or report (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the innermost error, looking through [`Error::Batch`] and
    /// [`Error::Commit`] wrappers.
    ///
    /// Useful for matching on the actual failure without caring where in the
    /// run it happened:
    ///
    /// ```rust
    /// use salesload::Error;
    ///
    /// let err = Error::Batch {
    ///     batch_index: 3,
    ///     source: Box::new(Error::Configuration("empty batch".into())),
    /// };
    /// assert!(matches!(err.root_cause(), Error::Configuration(_)));
    /// ```
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Batch { source, .. } | Error::Commit { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the root cause is a primary-key collision.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root_cause(), Error::ConstraintViolation { .. })
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages end up in the fatal log line, so they must name the
    /// batch and the cause.
    #[test]
    fn test_error_display() {
        let violation = Error::ConstraintViolation {
            first_id: TransactionId::from_raw(1001),
            last_id: TransactionId::from_raw(2000),
            reason: "duplicate key".to_string(),
        };
        assert_eq!(
            violation.to_string(),
            "constraint violation inserting transaction ids 1001..=2000: duplicate key"
        );

        let batch = Error::Batch {
            batch_index: 14,
            source: Box::new(Error::Configuration("boom".to_string())),
        };
        assert_eq!(batch.to_string(), "batch 14 failed: configuration error: boom");

        let conn = Error::Connection {
            path: "/nope/db.duckdb".to_string(),
            reason: "no such directory".to_string(),
        };
        assert!(conn.to_string().contains("/nope/db.duckdb"));
    }

    #[test]
    fn test_root_cause_unwraps_context() {
        let nested = Error::Commit {
            after_batch: 9,
            source: Box::new(Error::Batch {
                batch_index: 9,
                source: Box::new(Error::ConstraintViolation {
                    first_id: TransactionId::from_raw(1),
                    last_id: TransactionId::from_raw(10),
                    reason: "dup".to_string(),
                }),
            }),
        };

        assert!(nested.is_constraint_violation());
        assert!(matches!(
            nested.root_cause(),
            Error::ConstraintViolation { .. }
        ));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());
        let our_err: Error = sqlite_err.into();

        assert!(matches!(our_err, Error::Sqlite(_)));
        assert!(our_err.to_string().contains("sqlite error"));
    }
}
