//! Reporting snapshot produced by the metrics reporter.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time batching metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchingMetrics {
    pub total_batches: u64,
    pub pending_batches: u64,
    pub processing_batches: u64,
    pub settled_batches: u64,
    pub failed_batches: u64,

    pub pending_payments: u64,
    pub batched_payments: u64,
    pub settled_payments: u64,
    pub failed_payments: u64,

    /// Sum of `total_amount` over all batches.
    pub total_volume: Decimal,
    /// Sum of `total_amount` over PENDING batches.
    pub pending_volume: Decimal,
    /// Escrowed payments not yet assigned to a batch.
    pub unbatched_volume: Decimal,
    /// `total_volume / max(1, total_batches)`.
    pub average_batch_size: Decimal,
    /// Settled batches over all batches, in basis points.
    pub success_rate_bps: u64,
    /// Merchants with batching enabled.
    pub merchants_active: u64,
}
