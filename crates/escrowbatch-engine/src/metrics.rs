//! Read-only aggregation of batching state for reporting.

use escrowbatch_ledger::EscrowStore;
use escrowbatch_types::{
    Batch, BatchStatus, BatchingMetrics, MerchantConfig, PaymentStatus, PendingPayment, Result,
    constants,
};
use rust_decimal::Decimal;
use tracing::debug;

/// Computes [`BatchingMetrics`] snapshots.
pub struct MetricsReporter;

impl MetricsReporter {
    /// Pure aggregation over the given records.
    ///
    /// Averages and rates divide by `max(1, batch_count)`, so an empty
    /// system reports zeros.
    #[must_use]
    pub fn compute(
        batches: &[Batch],
        payments: &[PendingPayment],
        configs: &[MerchantConfig],
    ) -> BatchingMetrics {
        let mut m = BatchingMetrics::default();

        for batch in batches {
            m.total_batches += 1;
            m.total_volume += batch.total_amount;
            match batch.status {
                BatchStatus::Pending => {
                    m.pending_batches += 1;
                    m.pending_volume += batch.total_amount;
                }
                BatchStatus::Processing => m.processing_batches += 1,
                BatchStatus::Settled => m.settled_batches += 1,
                BatchStatus::Failed => m.failed_batches += 1,
            }
        }

        for payment in payments {
            match payment.status {
                PaymentStatus::Pending => {
                    m.pending_payments += 1;
                    m.unbatched_volume += payment.amount;
                }
                PaymentStatus::Batched => m.batched_payments += 1,
                PaymentStatus::Settled => m.settled_payments += 1,
                PaymentStatus::Failed => m.failed_payments += 1,
            }
        }

        let divisor = m.total_batches.max(1);
        m.average_batch_size =
            (m.total_volume / Decimal::from(divisor)).round_dp(constants::AMOUNT_PRECISION);
        m.success_rate_bps = m.settled_batches * constants::BPS_SCALE / divisor;
        m.merchants_active = configs.iter().filter(|c| c.batching_enabled).count() as u64;
        m
    }

    /// Aggregate everything in `store`.
    ///
    /// # Errors
    /// Returns `Storage` if a read fails.
    pub fn snapshot<S: EscrowStore>(store: &S) -> Result<BatchingMetrics> {
        let metrics = Self::compute(
            &store.batches()?,
            &store.payments()?,
            &store.merchant_configs()?,
        );
        debug!(
            batches = metrics.total_batches,
            volume = %metrics.total_volume,
            success_rate_bps = metrics.success_rate_bps,
            "metrics snapshot"
        );
        Ok(metrics)
    }
}
