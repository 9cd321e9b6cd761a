//! Settlement batches.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  settle()  ┌────────────┐  receipt   ┌─────────┐
//!   │ PENDING ├───────────▶│ PROCESSING ├───────────▶│ SETTLED │
//!   └─────────┘            └─────┬──────┘            └─────────┘
//!                                │ failure / timeout
//!                                ▼
//!                           ┌────────┐
//!                           │ FAILED │
//!                           └────────┘
//! ```
//!
//! PROCESSING is entered *before* the connector is called, so a second
//! settle attempt on the same batch observes a non-PENDING status and is
//! rejected. SETTLED and FAILED are terminal.
//!
//! Membership is fixed at creation and committed to by `membership_hash`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    BatchId, EscrowError, MerchantId, PaymentId, PendingPayment, Result, SettlementReceipt,
    constants,
};

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Settled,
    Failed,
}

impl BatchStatus {
    /// Can a batch move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing) | (Self::Processing, Self::Settled | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An immutable grouping of payments settled in one external transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub merchant_id: MerchantId,
    pub currency: String,
    /// Sum of member amounts.
    pub total_amount: Decimal,
    pub payment_count: u64,
    /// SHA-256 commitment over the sorted `(payment id, amount)` members.
    pub membership_hash: [u8; 32],
    pub created_at: DateTime<Utc>,
    /// When the batch entered PROCESSING.
    pub processing_started_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub tx_ref: Option<String>,
    /// Rail cost units consumed by the settlement.
    pub cost_units: Option<u64>,
    /// Fee charged by the rail.
    pub cost: Option<Decimal>,
    pub error_message: Option<String>,
    /// When a FAILED batch had its members written off.
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Build a PENDING batch over `payments`.
    ///
    /// The caller is responsible for moving the members to BATCHED in the
    /// same atomic write that stores the batch.
    ///
    /// # Errors
    /// - `Internal` if `payments` is empty
    /// - `CurrencyMismatch` if members disagree on currency
    pub fn seal(
        merchant_id: MerchantId,
        payments: &[PendingPayment],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let first = payments
            .first()
            .ok_or_else(|| EscrowError::Internal("cannot seal an empty batch".to_string()))?;
        if let Some(other) = payments.iter().find(|p| p.currency != first.currency) {
            return Err(EscrowError::CurrencyMismatch {
                expected: first.currency.clone(),
                actual: other.currency.clone(),
            });
        }

        let total_amount: Decimal = payments.iter().map(|p| p.amount).sum();
        let id = BatchId::new();
        Ok(Self {
            id,
            merchant_id,
            currency: first.currency.clone(),
            total_amount,
            payment_count: payments.len() as u64,
            membership_hash: Self::compute_membership_hash(id, payments),
            created_at: now,
            processing_started_at: None,
            settled_at: None,
            status: BatchStatus::Pending,
            tx_ref: None,
            cost_units: None,
            cost: None,
            error_message: None,
            abandoned_at: None,
        })
    }

    /// SHA-256 over the batch id and its members, sorted by payment id.
    ///
    /// Commits to:
    /// - Batch ID
    /// - Number of members
    /// - Each member's id and amount
    #[must_use]
    pub fn compute_membership_hash(id: BatchId, payments: &[PendingPayment]) -> [u8; 32] {
        let mut members: Vec<(PaymentId, Decimal)> =
            payments.iter().map(|p| (p.id, p.amount)).collect();
        members.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        hasher.update(constants::BATCH_COMMITMENT_DOMAIN);
        hasher.update(id.0.as_bytes());
        hasher.update((members.len() as u64).to_le_bytes());
        for (payment_id, amount) in &members {
            hasher.update(payment_id.0.as_bytes());
            hasher.update(amount.normalize().to_string().as_bytes());
        }

        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    /// Check that `members` are exactly the payments this batch was sealed over.
    ///
    /// # Errors
    /// Returns `BatchIntegrityViolation` on any mismatch of count, total or hash.
    pub fn verify_members(&self, members: &[PendingPayment]) -> Result<()> {
        if let Some(stranger) = members.iter().find(|p| p.batch_id != Some(self.id)) {
            return Err(EscrowError::BatchIntegrityViolation {
                reason: format!("payment {} is not a member of {}", stranger.id, self.id),
            });
        }
        if members.len() as u64 != self.payment_count {
            return Err(EscrowError::BatchIntegrityViolation {
                reason: format!(
                    "{}: expected {} members, found {}",
                    self.id,
                    self.payment_count,
                    members.len()
                ),
            });
        }
        let total: Decimal = members.iter().map(|p| p.amount).sum();
        if total != self.total_amount {
            return Err(EscrowError::BatchIntegrityViolation {
                reason: format!(
                    "{}: total_amount {} != member sum {total}",
                    self.id, self.total_amount
                ),
            });
        }
        if Self::compute_membership_hash(self.id, members) != self.membership_hash {
            return Err(EscrowError::BatchIntegrityViolation {
                reason: format!("{}: membership hash mismatch", self.id),
            });
        }
        Ok(())
    }

    /// Hex form of the membership commitment, for logs.
    #[must_use]
    pub fn membership_hex(&self) -> String {
        hex::encode(self.membership_hash)
    }

    fn transition(&mut self, to: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(EscrowError::InvalidBatchTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// PENDING → PROCESSING.
    ///
    /// # Errors
    /// Returns `InvalidBatchTransition` if not `Pending`.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(BatchStatus::Processing)?;
        self.processing_started_at = Some(now);
        Ok(())
    }

    /// PROCESSING → SETTLED, recording the receipt.
    ///
    /// # Errors
    /// Returns `InvalidBatchTransition` if not `Processing`.
    pub fn mark_settled(&mut self, receipt: &SettlementReceipt, now: DateTime<Utc>) -> Result<()> {
        self.transition(BatchStatus::Settled)?;
        self.settled_at = Some(now);
        self.tx_ref = Some(receipt.tx_ref.clone());
        self.cost_units = Some(receipt.cost_units);
        self.cost = Some(receipt.cost);
        self.error_message = None;
        Ok(())
    }

    /// PROCESSING → FAILED with `reason`.
    ///
    /// # Errors
    /// Returns `InvalidBatchTransition` if not `Processing`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(BatchStatus::Failed)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Stamp a FAILED batch as abandoned. Status stays FAILED.
    ///
    /// # Errors
    /// - `InvalidBatchState` if not `Failed`
    /// - `BatchAlreadyAbandoned` if already stamped
    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != BatchStatus::Failed {
            return Err(EscrowError::InvalidBatchState {
                id: self.id,
                status: self.status,
                expected: BatchStatus::Failed,
            });
        }
        if self.abandoned_at.is_some() {
            return Err(EscrowError::BatchAlreadyAbandoned(self.id));
        }
        self.abandoned_at = Some(now);
        Ok(())
    }

    /// Whether the batch's funds are still committed in escrow.
    ///
    /// True for PENDING, PROCESSING and FAILED batches not yet abandoned.
    #[must_use]
    pub fn holds_escrow(&self) -> bool {
        match self.status {
            BatchStatus::Pending | BatchStatus::Processing => true,
            BatchStatus::Failed => self.abandoned_at.is_none(),
            BatchStatus::Settled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(n: usize, amount: i64) -> (MerchantId, Vec<PendingPayment>) {
        let merchant = MerchantId::from("m-1");
        let payments = (0..n)
            .map(|_| PendingPayment::dummy(&merchant, Decimal::new(amount, 0)))
            .collect();
        (merchant, payments)
    }

    fn receipt() -> SettlementReceipt {
        SettlementReceipt {
            tx_ref: "tx-abc".into(),
            cost_units: 200_000,
            cost: Decimal::new(5, 3),
        }
    }

    #[test]
    fn seal_sums_members() {
        let (merchant, payments) = members(3, 40);
        let batch = Batch::seal(merchant, &payments, Utc::now()).unwrap();
        assert_eq!(batch.total_amount, Decimal::new(120, 0));
        assert_eq!(batch.payment_count, 3);
        assert_eq!(batch.status, BatchStatus::Pending);
        assert_ne!(batch.membership_hash, [0u8; 32]);
    }

    #[test]
    fn seal_empty_fails() {
        let err = Batch::seal(MerchantId::from("m"), &[], Utc::now()).unwrap_err();
        assert!(matches!(err, EscrowError::Internal(_)));
    }

    #[test]
    fn seal_mixed_currency_fails() {
        let (merchant, mut payments) = members(2, 10);
        payments[1].currency = "EURC".into();
        let err = Batch::seal(merchant, &payments, Utc::now()).unwrap_err();
        assert!(matches!(err, EscrowError::CurrencyMismatch { .. }));
    }

    #[test]
    fn membership_hash_is_order_independent() {
        let (_, payments) = members(4, 7);
        let id = BatchId::new();
        let mut reversed = payments.clone();
        reversed.reverse();
        assert_eq!(
            Batch::compute_membership_hash(id, &payments),
            Batch::compute_membership_hash(id, &reversed)
        );
    }

    #[test]
    fn membership_hash_ignores_amount_scale() {
        let (_, payments) = members(1, 5);
        let id = BatchId::new();
        let mut rescaled = payments.clone();
        rescaled[0].amount = Decimal::new(500, 2);
        assert_eq!(
            Batch::compute_membership_hash(id, &payments),
            Batch::compute_membership_hash(id, &rescaled)
        );
    }

    #[test]
    fn verify_members_detects_tampering() {
        let (merchant, mut payments) = members(3, 40);
        let batch = Batch::seal(merchant, &payments, Utc::now()).unwrap();
        for p in &mut payments {
            p.mark_batched(batch.id).unwrap();
        }
        batch.verify_members(&payments).unwrap();

        let mut inflated = payments.clone();
        inflated[0].amount += Decimal::ONE;
        assert!(matches!(
            batch.verify_members(&inflated),
            Err(EscrowError::BatchIntegrityViolation { .. })
        ));

        let short = &payments[..2];
        assert!(batch.verify_members(short).is_err());
    }

    #[test]
    fn state_transitions() {
        assert!(BatchStatus::Pending.can_transition_to(BatchStatus::Processing));
        assert!(BatchStatus::Processing.can_transition_to(BatchStatus::Settled));
        assert!(BatchStatus::Processing.can_transition_to(BatchStatus::Failed));
        assert!(!BatchStatus::Pending.can_transition_to(BatchStatus::Settled));
        assert!(!BatchStatus::Settled.can_transition_to(BatchStatus::Processing));
        assert!(!BatchStatus::Failed.can_transition_to(BatchStatus::Pending));
        assert!(!BatchStatus::Failed.can_transition_to(BatchStatus::Processing));
    }

    #[test]
    fn settle_lifecycle_records_receipt() {
        let (merchant, payments) = members(1, 500);
        let mut batch = Batch::seal(merchant, &payments, Utc::now()).unwrap();
        batch.mark_processing(Utc::now()).unwrap();
        assert!(batch.processing_started_at.is_some());
        batch.mark_settled(&receipt(), Utc::now()).unwrap();
        assert_eq!(batch.status, BatchStatus::Settled);
        assert_eq!(batch.tx_ref.as_deref(), Some("tx-abc"));
        assert_eq!(batch.cost_units, Some(200_000));
        assert!(!batch.holds_escrow());
    }

    #[test]
    fn cannot_settle_without_processing() {
        let (merchant, payments) = members(1, 500);
        let mut batch = Batch::seal(merchant, &payments, Utc::now()).unwrap();
        let err = batch.mark_settled(&receipt(), Utc::now()).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidBatchTransition { .. }));
        assert!(batch.tx_ref.is_none());
    }

    #[test]
    fn abandon_only_failed_and_once() {
        let (merchant, payments) = members(1, 500);
        let mut batch = Batch::seal(merchant, &payments, Utc::now()).unwrap();
        assert!(batch.mark_abandoned(Utc::now()).is_err());

        batch.mark_processing(Utc::now()).unwrap();
        batch.mark_failed("rail rejected").unwrap();
        assert!(batch.holds_escrow());
        batch.mark_abandoned(Utc::now()).unwrap();
        assert!(!batch.holds_escrow());
        assert!(matches!(
            batch.mark_abandoned(Utc::now()),
            Err(EscrowError::BatchAlreadyAbandoned(_))
        ));
    }
}
