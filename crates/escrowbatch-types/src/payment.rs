//! Payment records held in the escrow ledger.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  batched   ┌─────────┐  settled   ┌─────────┐
//!   │ PENDING ├───────────▶│ BATCHED ├───────────▶│ SETTLED │
//!   └─────────┘            └────┬────┘            └─────────┘
//!                               │ abandoned
//!                               ▼
//!                          ┌────────┐
//!                          │ FAILED │
//!                          └────────┘
//! ```
//!
//! Transitions are strictly forward. A payment never returns to PENDING,
//! so a failed batch cannot silently resubmit its members.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, EscrowError, MerchantId, PaymentId, Result};

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Held in escrow, not yet assigned to a batch.
    Pending,
    /// Member of a batch awaiting (or having failed) settlement.
    Batched,
    /// Funds delivered to the merchant.
    Settled,
    /// Member of an abandoned batch. Terminal.
    Failed,
}

impl PaymentStatus {
    /// Can a payment move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Batched) | (Self::Batched, Self::Settled | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Batched => write!(f, "BATCHED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A single merchant payment.
///
/// Escrow-path payments are born `Pending`; direct (Free tier) payments are
/// recorded already `Settled` and never carry a `batch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub id: PaymentId,
    pub merchant_id: MerchantId,
    /// Payer wallet.
    pub wallet: String,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub status: PaymentStatus,
    /// Set when the payment joins a batch. Never changes afterwards.
    pub batch_id: Option<BatchId>,
    /// Settlement transaction reference.
    pub tx_ref: Option<String>,
}

impl PendingPayment {
    /// A new escrow-held payment in `Pending`.
    ///
    /// # Errors
    /// Returns `InvalidAmount` unless `amount > 0`.
    pub fn new(
        merchant_id: MerchantId,
        wallet: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount(amount));
        }
        Ok(Self {
            id: PaymentId::new(),
            merchant_id,
            wallet: wallet.into(),
            amount,
            currency: currency.into(),
            created_at: now,
            status: PaymentStatus::Pending,
            batch_id: None,
            tx_ref: None,
        })
    }

    /// Settle a fresh payment directly on the rail, skipping escrow.
    ///
    /// Only valid for a `Pending` payment that was never batched; the
    /// payment is then born `Settled` and never enters the ledger.
    ///
    /// # Errors
    /// Returns `InvalidPaymentTransition` otherwise.
    pub fn settle_direct(&mut self, tx_ref: impl Into<String>) -> Result<()> {
        if self.status != PaymentStatus::Pending || self.batch_id.is_some() {
            return Err(EscrowError::InvalidPaymentTransition {
                id: self.id,
                from: self.status,
                to: PaymentStatus::Settled,
            });
        }
        self.status = PaymentStatus::Settled;
        self.tx_ref = Some(tx_ref.into());
        Ok(())
    }

    fn transition(&mut self, to: PaymentStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(EscrowError::InvalidPaymentTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// PENDING → BATCHED, binding the payment to `batch_id`.
    ///
    /// # Errors
    /// Returns `InvalidPaymentTransition` if not `Pending`.
    pub fn mark_batched(&mut self, batch_id: BatchId) -> Result<()> {
        self.transition(PaymentStatus::Batched)?;
        self.batch_id = Some(batch_id);
        Ok(())
    }

    /// BATCHED → SETTLED, inheriting the batch's transaction reference.
    ///
    /// # Errors
    /// Returns `InvalidPaymentTransition` if not `Batched`.
    pub fn mark_settled(&mut self, tx_ref: &str) -> Result<()> {
        self.transition(PaymentStatus::Settled)?;
        self.tx_ref = Some(tx_ref.to_string());
        Ok(())
    }

    /// BATCHED → FAILED.
    ///
    /// # Errors
    /// Returns `InvalidPaymentTransition` if not `Batched`.
    pub fn mark_failed(&mut self) -> Result<()> {
        self.transition(PaymentStatus::Failed)
    }
}

/// Dummy payment for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl PendingPayment {
    /// Pending payment of `amount` USDC from a random wallet.
    pub fn dummy(merchant_id: &MerchantId, amount: Decimal) -> Self {
        Self {
            id: PaymentId::new(),
            merchant_id: merchant_id.clone(),
            wallet: format!("wallet-{:08x}", rand::random::<u32>()),
            amount,
            currency: crate::constants::DEFAULT_CURRENCY.to_string(),
            created_at: Utc::now(),
            status: PaymentStatus::Pending,
            batch_id: None,
            tx_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payment() -> PendingPayment {
        PendingPayment::dummy(&MerchantId::from("m-1"), Decimal::new(40, 0))
    }

    #[test]
    fn state_transitions_valid() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Batched));
        assert!(PaymentStatus::Batched.can_transition_to(PaymentStatus::Settled));
        assert!(PaymentStatus::Batched.can_transition_to(PaymentStatus::Failed));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Settled));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Batched.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Batched));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Failed));
    }

    #[test]
    fn non_positive_amount_rejected() {
        let merchant = MerchantId::from("m-1");
        let err = PendingPayment::new(merchant.clone(), "w", Decimal::ZERO, "USDC", Utc::now())
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount(_)));
        assert!(
            PendingPayment::new(merchant, "w", Decimal::new(-1, 0), "USDC", Utc::now()).is_err()
        );
    }

    #[test]
    fn batched_then_settled() {
        let mut payment = make_payment();
        let batch = BatchId::new();
        payment.mark_batched(batch).unwrap();
        assert_eq!(payment.batch_id, Some(batch));
        payment.mark_settled("tx-1").unwrap();
        assert_eq!(payment.status, PaymentStatus::Settled);
        assert_eq!(payment.tx_ref.as_deref(), Some("tx-1"));
    }

    #[test]
    fn cannot_skip_batched() {
        let mut payment = make_payment();
        let err = payment.mark_settled("tx").unwrap_err();
        assert!(matches!(err, EscrowError::InvalidPaymentTransition { .. }));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.tx_ref.is_none());
    }

    #[test]
    fn double_batching_blocked() {
        let mut payment = make_payment();
        let first = BatchId::new();
        payment.mark_batched(first).unwrap();
        assert!(payment.mark_batched(BatchId::new()).is_err());
        assert_eq!(payment.batch_id, Some(first));
    }

    #[test]
    fn direct_payment_is_settled_without_batch() {
        let mut payment =
            PendingPayment::new(MerchantId::from("m-1"), "w", Decimal::ONE, "USDC", Utc::now())
                .unwrap();
        payment.settle_direct("direct-tx").unwrap();
        assert_eq!(payment.status, PaymentStatus::Settled);
        assert_eq!(payment.tx_ref.as_deref(), Some("direct-tx"));
        assert!(payment.batch_id.is_none());
    }

    #[test]
    fn batched_payment_cannot_settle_direct() {
        let mut payment = make_payment();
        payment.mark_batched(BatchId::new()).unwrap();
        assert!(payment.settle_direct("tx").is_err());
        assert_eq!(payment.status, PaymentStatus::Batched);
    }

    #[test]
    fn serde_roundtrip() {
        let payment = make_payment();
        let json = serde_json::to_string(&payment).unwrap();
        let back: PendingPayment = serde_json::from_str(&json).unwrap();
        assert_eq!(payment, back);
    }
}
