//! # Load Orchestrator
//!
//! Drives a whole run: for each batch index it synthesizes the rows, bulk
//! inserts them, commits when the [`CommitPolicy`] says so, and reports
//! progress. After the last batch it commits once more.
//!
//! ```text
//!   Idle ──► Running(0) ──► Running(1) ──► ... ──► Running(n-1) ──► Completed
//!                │  ▲                                   │
//!                ▼  │                                   ▼
//!           Committing(i)                          Committing(n-1)
//!                │
//!                ▼
//!             Failed ◄── any synthesize / insert / commit error
//! ```
//!
//! ## Failure Semantics
//!
//! The first error aborts the run. The open transaction is rolled back, so
//! the table keeps exactly the rows of the commits that already happened:
//! with commits every 10 batches of 1000, a failure in batch 15 leaves 10 000
//! rows. There are no retries. The store is closed on every path.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bulk::load_batch;
use crate::config::{BatchPlan, CommitPolicy, LoadConfig};
use crate::error::{Error, Result};
use crate::observer::{CommitEvent, LoadObserver};
use crate::schema::ensure_table_exists;
use crate::store::{AnyStore, Engine, Storage};
use crate::synthesizer::RowSynthesizer;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    /// Loading the batch at this index.
    Running(usize),
    /// Flushing after the batch at this index.
    Committing(usize),
    /// Aborted while at this batch index.
    Failed(usize),
    Completed,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows_loaded: u64,
    pub batches: usize,
    pub commits: usize,
    /// Rows skipped by a truncating remainder policy.
    pub dropped_rows: u64,
    pub elapsed_ms: u64,
}

/// Owns the store and the synthesizer for one run.
pub struct LoadOrchestrator<S: Storage, R> {
    store: S,
    synthesizer: RowSynthesizer<R>,
    plan: BatchPlan,
    commit: CommitPolicy,
    phase: RunPhase,
    rows_loaded: u64,
    rows_committed: u64,
    commits: usize,
}

impl<S: Storage> LoadOrchestrator<S, StdRng> {
    /// Builds an orchestrator whose synthesizer is seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the config is invalid. Storage is not touched.
    pub fn new(store: S, config: &LoadConfig) -> Result<Self> {
        let plan = config.plan()?;
        let synthesizer = RowSynthesizer::seeded(&config.domains, config.seed)?;
        Ok(Self::from_parts(store, synthesizer, plan, config.commit))
    }
}

impl<S: Storage, R: Rng> LoadOrchestrator<S, R> {
    /// Builds an orchestrator over a caller-supplied random source.
    pub fn with_rng(store: S, config: &LoadConfig, rng: R) -> Result<Self> {
        let plan = config.plan()?;
        let synthesizer = RowSynthesizer::new(&config.domains, rng)?;
        Ok(Self::from_parts(store, synthesizer, plan, config.commit))
    }

    fn from_parts(
        store: S,
        synthesizer: RowSynthesizer<R>,
        plan: BatchPlan,
        commit: CommitPolicy,
    ) -> Self {
        Self {
            store,
            synthesizer,
            plan,
            commit,
            phase: RunPhase::Idle,
            rows_loaded: 0,
            rows_committed: 0,
            commits: 0,
        }
    }

    /// Pins "now" for timestamp generation.
    pub fn with_anchor(mut self, now: NaiveDateTime) -> Self {
        self.synthesizer = self.synthesizer.with_anchor(now);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Executes the run and closes the store.
    ///
    /// # Errors
    ///
    /// - `Error::Batch` if a batch could not be loaded
    /// - `Error::Commit` if a flush point failed
    ///
    /// Either way, every commit made before the failure stays durable.
    pub fn run<O: LoadObserver>(mut self, mut observer: O) -> Result<LoadSummary> {
        let started = Instant::now();
        let outcome = self.load_all(&mut observer);
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                self.phase = RunPhase::Completed;
                observer.finished(true, elapsed);
                let summary = self.summary(elapsed);
                info!(
                    rows = summary.rows_loaded,
                    batches = summary.batches,
                    commits = summary.commits,
                    elapsed_ms = summary.elapsed_ms,
                    "load complete"
                );
                self.store.close()?;
                Ok(summary)
            }
            Err(e) => {
                let at = match self.phase {
                    RunPhase::Running(i) | RunPhase::Committing(i) => i,
                    _ => 0,
                };
                self.phase = RunPhase::Failed(at);
                error!(
                    batch_index = at,
                    rows_committed = self.rows_committed,
                    error = %e,
                    "load aborted"
                );
                observer.finished(false, elapsed);

                if let Err(rollback_err) = self.store.rollback() {
                    warn!(error = %rollback_err, "rollback after failure also failed");
                }
                if let Err(close_err) = self.store.close() {
                    warn!(error = %close_err, "closing store after failure failed");
                }
                Err(e)
            }
        }
    }

    fn load_all<O: LoadObserver>(&mut self, observer: &mut O) -> Result<()> {
        let total = self.plan.num_batches();
        info!(
            batches = total,
            batch_size = self.plan.batch_size(),
            rows = self.plan.rows_to_load(),
            commit_interval = self.commit.interval,
            "starting load"
        );
        if self.plan.dropped_rows() > 0 {
            warn!(
                dropped = self.plan.dropped_rows(),
                "row count is not a multiple of the batch size; remainder will not be loaded"
            );
        }

        for batch_index in 0..total {
            self.phase = RunPhase::Running(batch_index);

            let start_id = self.plan.start_id(batch_index);
            let batch = self
                .synthesizer
                .generate_batch(start_id, self.plan.batch_len(batch_index));

            load_batch(&mut self.store, &batch).map_err(|source| Error::Batch {
                batch_index,
                source: Box::new(source),
            })?;
            self.rows_loaded += batch.len() as u64;

            if self.commit.commits_after(batch_index) {
                self.commit_through(batch_index, false, observer)?;
            }

            observer.report(batch_index + 1, total);
        }

        self.commit_through(total.saturating_sub(1), true, observer)
    }

    fn commit_through<O: LoadObserver>(
        &mut self,
        after_batch: usize,
        is_final: bool,
        observer: &mut O,
    ) -> Result<()> {
        self.phase = RunPhase::Committing(after_batch);

        let pending = self.rows_loaded - self.rows_committed;
        self.store.commit().map_err(|source| Error::Commit {
            after_batch,
            source: Box::new(source),
        })?;

        if pending == 0 {
            debug!(after_batch, "final commit had nothing pending");
            return Ok(());
        }

        self.rows_committed = self.rows_loaded;
        self.commits += 1;
        observer.committed(&CommitEvent {
            after_batch,
            rows_committed: self.rows_committed,
            is_final,
        });
        debug!(after_batch, rows = self.rows_committed, is_final, "committed");
        Ok(())
    }

    fn summary(&self, elapsed: Duration) -> LoadSummary {
        LoadSummary {
            rows_loaded: self.rows_loaded,
            batches: self.plan.num_batches(),
            commits: self.commits,
            dropped_rows: self.plan.dropped_rows(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Opens `path`, creates the table if needed, and runs a full load.
///
/// The config is validated before the database is opened, so an invalid
/// config never creates or modifies a file.
pub fn run_load<O: LoadObserver>(
    engine: Engine,
    path: impl AsRef<Path>,
    config: &LoadConfig,
    observer: O,
) -> Result<LoadSummary> {
    config.plan()?;

    let mut store = AnyStore::open(engine, path.as_ref())?;
    if let Err(e) = ensure_table_exists(&mut store) {
        let _ = store.close();
        return Err(e);
    }

    LoadOrchestrator::new(store, config)?.run(observer)
}

// =============================================================================
// Tests
// =============================================================================
