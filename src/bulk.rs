//! # Batch Loader
//!
//! Moves one [`Batch`] into storage with a single bulk insert. The loader
//! neither commits nor retries; both are the orchestrator's call.

use std::time::Instant;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::store::Storage;
use crate::types::Batch;

/// Inserts every row of `batch` in one atomic storage call.
///
/// # Errors
///
/// - `Error::Configuration` for an empty batch (nothing is sent to storage)
/// - `Error::ConstraintViolation` if any id already exists
/// - engine errors as-is; the batch is then entirely absent
pub fn load_batch<S: Storage>(store: &mut S, batch: &Batch) -> Result<()> {
    let (Some(first_id), Some(last_id)) = (batch.first_id(), batch.last_id()) else {
        return Err(Error::Configuration(
            "cannot load an empty batch".to_string(),
        ));
    };

    let started = Instant::now();
    if let Err(e) = store.execute_bulk_insert(batch.records()) {
        error!(%first_id, %last_id, error = %e, "bulk insert rejected");
        return Err(e);
    }

    debug!(
        %first_id,
        %last_id,
        rows = batch.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch inserted"
    );
    Ok(())
}
