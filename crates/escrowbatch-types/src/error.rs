//! Error types for the EscrowBatch engine.
//!
//! All errors use the `EB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Merchant / configuration errors
//! - 2xx: Payment / ledger errors
//! - 3xx: Batch errors
//! - 4xx: Settlement errors
//! - 9xx: Storage / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BatchId, BatchStatus, MerchantId, PaymentId, PaymentStatus};

/// Central error enum for all EscrowBatch operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    // =================================================================
    // Merchant Errors (1xx)
    // =================================================================
    /// No configuration exists for this merchant.
    #[error("EB_ERR_100: Merchant not found: {0}")]
    MerchantNotFound(MerchantId),

    /// A merchant configuration update was rejected.
    #[error("EB_ERR_101: Invalid merchant config: {reason}")]
    InvalidMerchantConfig { reason: String },

    /// The payment currency differs from the merchant's settlement currency.
    #[error("EB_ERR_102: Currency mismatch: merchant settles in {expected}, payment is {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    // =================================================================
    // Payment Errors (2xx)
    // =================================================================
    /// Payment amounts must be strictly positive.
    #[error("EB_ERR_200: Invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    /// A payment with this id is already recorded.
    #[error("EB_ERR_201: Duplicate payment: {0}")]
    DuplicatePayment(PaymentId),

    /// The requested payment was not found.
    #[error("EB_ERR_202: Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A payment status change would move backwards or skip a state.
    #[error("EB_ERR_203: Invalid payment transition for {id}: {from} -> {to}")]
    InvalidPaymentTransition {
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    // =================================================================
    // Batch Errors (3xx)
    // =================================================================
    /// The requested batch was not found.
    #[error("EB_ERR_300: Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// The batch is not in the state the operation requires.
    #[error("EB_ERR_301: Batch {id} is {status}, expected {expected}")]
    InvalidBatchState {
        id: BatchId,
        status: BatchStatus,
        expected: BatchStatus,
    },

    /// A batch status change would leave a terminal state or skip one.
    #[error("EB_ERR_302: Invalid batch transition for {id}: {from} -> {to}")]
    InvalidBatchTransition {
        id: BatchId,
        from: BatchStatus,
        to: BatchStatus,
    },

    /// A batch with this id already exists.
    #[error("EB_ERR_303: Duplicate batch: {0}")]
    DuplicateBatch(BatchId),

    /// Stored members no longer match the batch totals or commitment.
    #[error("EB_ERR_304: Batch integrity violation: {reason}")]
    BatchIntegrityViolation { reason: String },

    /// The failed batch has already been abandoned.
    #[error("EB_ERR_305: Batch already abandoned: {0}")]
    BatchAlreadyAbandoned(BatchId),

    // =================================================================
    // Settlement Errors (4xx)
    // =================================================================
    /// Emergency pause is active; no settlement is attempted.
    #[error("EB_ERR_400: Settlement paused")]
    SettlementPaused,

    /// The settlement connector reported a failure.
    #[error("EB_ERR_401: Settlement connector failure: {reason}")]
    ConnectorFailure { reason: String },

    /// An escrow account no longer matches the batches it is holding.
    #[error("EB_ERR_402: Escrow balance invariant violation: {reason}")]
    EscrowInvariantViolation { reason: String },

    // =================================================================
    // Storage / Internal (9xx)
    // =================================================================
    /// The storage collaborator failed. Nothing was committed.
    #[error("EB_ERR_900: Storage error: {0}")]
    Storage(String),

    /// Serialization / deserialization error.
    #[error("EB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config document, bad values, etc.).
    #[error("EB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("EB_ERR_903: Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Whether this is a domain rejection (reported to callers as a negative
    /// result) rather than a fault of the storage layer or the engine itself.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_)
                | Self::Serialization(_)
                | Self::Configuration(_)
                | Self::Internal(_)
                | Self::EscrowInvariantViolation { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
