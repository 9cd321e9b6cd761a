//! Settlement timeout sweep.
//!
//! A batch is committed as PROCESSING before the connector is called. If the
//! outcome is never recorded (crash, lost commit) the batch would stay
//! PROCESSING forever, so a periodic sweep fails every batch that has been
//! PROCESSING for longer than `settlement_timeout`. Members stay BATCHED and
//! the escrow commitment is kept, exactly as for a connector failure.

use chrono::{DateTime, Utc};
use escrowbatch_ledger::{Changeset, EscrowStore};
use escrowbatch_types::{BatchId, BatchStatus, Result};
use tracing::{info, warn};

use crate::executor::settlement_config;

/// Error message recorded on expired batches.
pub const TIMEOUT_REASON: &str = "settlement timed out";

/// Fail every PROCESSING batch whose `processing_started_at + timeout < now`.
///
/// All expirations are committed in one write. Returns the expired ids,
/// oldest batch first.
///
/// # Errors
/// Returns `Storage` if a read or the commit fails (nothing is expired).
pub fn expire_stuck_settlements<S: EscrowStore>(
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<Vec<BatchId>> {
    let timeout = settlement_config(store)?.settlement_timeout;
    let Ok(timeout) = chrono::Duration::from_std(timeout) else {
        warn!(?timeout, "settlement timeout out of range; sweep skipped");
        return Ok(Vec::new());
    };

    let mut changes = Changeset::new();
    let mut expired = Vec::new();
    for mut batch in store.batches()? {
        if batch.status != BatchStatus::Processing {
            continue;
        }
        let Some(started) = batch.processing_started_at else {
            warn!(batch = %batch.id, "processing batch without start time");
            continue;
        };
        // Overflow past the calendar means the batch never expires.
        if started.checked_add_signed(timeout).is_none_or(|deadline| deadline >= now) {
            continue;
        }
        batch.mark_failed(TIMEOUT_REASON)?;
        warn!(
            batch = %batch.id,
            merchant = %batch.merchant_id,
            %started,
            "settlement timed out"
        );
        expired.push(batch.id);
        changes.update_batch(batch);
    }

    if !changes.is_empty() {
        store.commit(changes)?;
        info!(count = expired.len(), "stuck settlements expired");
    }
    Ok(expired)
}
