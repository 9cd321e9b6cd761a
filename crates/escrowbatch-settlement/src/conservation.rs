//! Escrow conservation checks.
//!
//! Invariants checked against stored state:
//! ```text
//! ∀ batch:    total_amount == Σ amount of payments with batch_id == batch.id
//! ∀ merchant: account.total_balance == Σ total_amount of batches holding escrow
//!             account.pending_batch_count == |batches holding escrow|
//! ```
//!
//! A batch holds escrow while it is PENDING, PROCESSING, or FAILED and not
//! yet abandoned.

use escrowbatch_ledger::EscrowStore;
use escrowbatch_types::{Batch, BatchId, EscrowError, MerchantId, Result};
use rust_decimal::Decimal;

/// Recompute count, total and membership hash of `batch_id` from the store.
///
/// # Errors
/// - `BatchNotFound` if the batch does not exist
/// - `BatchIntegrityViolation` if the stored members disagree with the batch
pub fn verify_batch_integrity<S: EscrowStore>(store: &S, batch_id: BatchId) -> Result<Batch> {
    let batch = store
        .batch(batch_id)?
        .ok_or(EscrowError::BatchNotFound(batch_id))?;
    let members = store.payments_in_batch(batch_id)?;
    batch.verify_members(&members)?;
    Ok(batch)
}

/// What a merchant's account should hold, derived from its batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedEscrow {
    pub balance: Decimal,
    pub batch_count: u64,
}

impl ExpectedEscrow {
    /// Sum over the batches of one merchant that still hold escrow.
    #[must_use]
    pub fn from_batches<'a>(batches: impl IntoIterator<Item = &'a Batch>) -> Self {
        batches
            .into_iter()
            .filter(|b| b.holds_escrow())
            .fold(Self::default(), |acc, b| Self {
                balance: acc.balance + b.total_amount,
                batch_count: acc.batch_count + 1,
            })
    }
}

impl Default for ExpectedEscrow {
    fn default() -> Self {
        Self {
            balance: Decimal::ZERO,
            batch_count: 0,
        }
    }
}

/// Check that the merchant's escrow account matches its batches.
///
/// A merchant with no account must have no escrow-holding batches.
///
/// # Errors
/// Returns `EscrowInvariantViolation` on any mismatch.
pub fn verify_escrow_balance<S: EscrowStore>(store: &S, merchant_id: &MerchantId) -> Result<()> {
    let batches = store.batches_for_merchant(merchant_id)?;
    let expected = ExpectedEscrow::from_batches(&batches);
    let (balance, count) = store
        .escrow_account(merchant_id)?
        .map_or((Decimal::ZERO, 0), |a| (a.total_balance, a.pending_batch_count));

    if balance != expected.balance || count != expected.batch_count {
        return Err(EscrowError::EscrowInvariantViolation {
            reason: format!(
                "{merchant_id}: account holds {balance} in {count} batches, \
                 batches hold {} in {}",
                expected.balance, expected.batch_count
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use escrowbatch_ledger::{BatchAggregator, Changeset, EscrowLedger, InMemoryStore};
    use escrowbatch_types::{EscrowAccount, PendingPayment, SettlementReceipt};

    fn merchant() -> MerchantId {
        MerchantId::from("shop-1")
    }

    fn store_with_batch(amounts: &[i64]) -> (InMemoryStore, Batch) {
        let mut store = InMemoryStore::new();
        let mut ledger = EscrowLedger::new(&mut store);
        let mut pending = Vec::new();
        for amount in amounts {
            let payment = PendingPayment::dummy(&merchant(), Decimal::new(*amount, 0));
            ledger.append(payment.clone()).unwrap();
            pending.push(payment);
        }
        let batch = BatchAggregator::default()
            .create_batch(&mut store, &merchant(), &pending, Utc::now())
            .unwrap();
        (store, batch)
    }

    #[test]
    fn fresh_batch_verifies() {
        let (store, batch) = store_with_batch(&[40, 40, 40]);
        assert_eq!(verify_batch_integrity(&store, batch.id).unwrap(), batch);
        verify_escrow_balance(&store, &merchant()).unwrap();
    }

    #[test]
    fn missing_batch_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            verify_batch_integrity(&store, BatchId::new()),
            Err(EscrowError::BatchNotFound(_))
        ));
    }

    #[test]
    fn unknown_merchant_is_balanced() {
        let store = InMemoryStore::new();
        verify_escrow_balance(&store, &MerchantId::from("nobody")).unwrap();
    }

    #[test]
    fn drifted_account_detected() {
        let (mut store, _) = store_with_batch(&[40, 40, 40]);
        let mut account = store.escrow_account(&merchant()).unwrap().unwrap();
        account.total_balance += Decimal::ONE;
        let mut changes = Changeset::new();
        changes.put_account(account);
        store.commit(changes).unwrap();

        let err = verify_escrow_balance(&store, &merchant()).unwrap_err();
        assert!(matches!(err, EscrowError::EscrowInvariantViolation { .. }));
        assert!(!err.is_rejection());
    }

    #[test]
    fn settled_batches_hold_nothing() {
        let (_, mut batch) = store_with_batch(&[500]);
        batch.mark_processing(Utc::now()).unwrap();
        let processing = batch.clone();
        batch
            .mark_settled(
                &SettlementReceipt {
                    tx_ref: "tx".into(),
                    cost_units: 1,
                    cost: Decimal::ONE,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(ExpectedEscrow::from_batches([&batch]), ExpectedEscrow::default());
        assert_eq!(
            ExpectedEscrow::from_batches([&processing, &batch]),
            ExpectedEscrow {
                balance: Decimal::new(500, 0),
                batch_count: 1
            }
        );
    }

    #[test]
    fn account_without_batches_must_be_empty() {
        let mut store = InMemoryStore::new();
        let mut account = EscrowAccount::open(merchant(), Utc::now());
        account.commit_batch(Decimal::TEN);
        let mut changes = Changeset::new();
        changes.put_account(account);
        store.commit(changes).unwrap();
        assert!(verify_escrow_balance(&store, &merchant()).is_err());
    }
}
