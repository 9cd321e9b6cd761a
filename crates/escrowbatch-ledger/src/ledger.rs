//! Escrow ledger: the per-merchant set of payments waiting for a batch.
//!
//! Appending a payment also opens the merchant's [`EscrowAccount`] the first
//! time the merchant is seen, in the same atomic write.

use std::ops::{Deref, DerefMut};

use chrono::Utc;
use escrowbatch_types::{
    EscrowAccount, EscrowError, MerchantId, PaymentId, PaymentStatus, PendingPayment, Result,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::store::{Changeset, EscrowStore};

/// The pending payment set of an [`EscrowStore`].
///
/// Built over `&S` it only reads; built over `&mut S` it can also append.
pub struct EscrowLedger<B> {
    store: B,
}

impl<B> EscrowLedger<B>
where
    B: Deref<Target: EscrowStore>,
{
    pub fn new(store: B) -> Self {
        Self { store }
    }

    /// All `Pending` payments of `merchant_id`, oldest first.
    ///
    /// # Errors
    /// Returns `Storage` if the read fails.
    pub fn pending_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<PendingPayment>> {
        let mut pending = self
            .store
            .payments_with_status(merchant_id, PaymentStatus::Pending)?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    /// Sum of the merchant's `Pending` payment amounts.
    ///
    /// # Errors
    /// Returns `Storage` if the read fails.
    pub fn pending_total(&self, merchant_id: &MerchantId) -> Result<Decimal> {
        Ok(self
            .pending_by_merchant(merchant_id)?
            .iter()
            .map(|p| p.amount)
            .sum())
    }
}

impl<B> EscrowLedger<B>
where
    B: DerefMut<Target: EscrowStore>,
{
    /// Store a new `Pending` payment.
    ///
    /// # Errors
    /// - `InvalidAmount` unless `amount > 0`
    /// - `InvalidPaymentTransition` if the payment is not `Pending`
    /// - `DuplicatePayment` if the id is already recorded
    /// - `Storage` if the commit fails (nothing is written)
    pub fn append(&mut self, payment: PendingPayment) -> Result<PaymentId> {
        self.append_with(Changeset::new(), payment)
    }

    /// Like [`append`](Self::append), committing `changes` in the same write.
    ///
    /// Used when the first payment of a merchant also creates its config.
    ///
    /// # Errors
    /// As [`append`](Self::append).
    pub fn append_with(
        &mut self,
        mut changes: Changeset,
        payment: PendingPayment,
    ) -> Result<PaymentId> {
        if payment.amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount(payment.amount));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(EscrowError::InvalidPaymentTransition {
                id: payment.id,
                from: payment.status,
                to: PaymentStatus::Pending,
            });
        }

        let opened = if self.store.escrow_account(&payment.merchant_id)?.is_none() {
            changes.put_account(EscrowAccount::open(payment.merchant_id.clone(), Utc::now()));
            true
        } else {
            false
        };

        let id = payment.id;
        let merchant = payment.merchant_id.clone();
        let amount = payment.amount;
        changes.insert_payment(payment);
        self.store.commit(changes)?;

        if opened {
            info!(merchant = %merchant, "escrow account opened");
        }
        debug!(payment = %id, merchant = %merchant, %amount, "payment appended to escrow ledger");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use escrowbatch_types::{BatchId, MerchantConfig, MerchantDefaults, Tier};

    fn merchant() -> MerchantId {
        MerchantId::from("shop-1")
    }

    #[test]
    fn append_opens_account_once() {
        let mut store = InMemoryStore::new();
        let mut ledger = EscrowLedger::new(&mut store);
        ledger
            .append(PendingPayment::dummy(&merchant(), Decimal::new(30, 0)))
            .unwrap();
        ledger
            .append(PendingPayment::dummy(&merchant(), Decimal::new(20, 0)))
            .unwrap();

        assert_eq!(ledger.pending_by_merchant(&merchant()).unwrap().len(), 2);
        assert_eq!(ledger.pending_total(&merchant()).unwrap(), Decimal::new(50, 0));

        let account = store.escrow_account(&merchant()).unwrap().unwrap();
        assert_eq!(account.total_balance, Decimal::ZERO);
        assert_eq!(account.pending_batch_count, 0);
    }

    #[test]
    fn rejects_non_positive_amount() {
        let mut store = InMemoryStore::new();
        let mut ledger = EscrowLedger::new(&mut store);
        let err = ledger
            .append(PendingPayment::dummy(&merchant(), Decimal::ZERO))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount(_)));
        assert_eq!(store.payment_count(), 0);
        assert!(store.escrow_account(&merchant()).unwrap().is_none());
    }

    #[test]
    fn rejects_non_pending_payment() {
        let mut store = InMemoryStore::new();
        let mut payment = PendingPayment::dummy(&merchant(), Decimal::ONE);
        payment.mark_batched(BatchId::new()).unwrap();
        let err = EscrowLedger::new(&mut store).append(payment).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidPaymentTransition { .. }));
    }

    #[test]
    fn duplicate_append_mutates_nothing() {
        let mut store = InMemoryStore::new();
        let payment = PendingPayment::dummy(&merchant(), Decimal::new(5, 0));
        let mut ledger = EscrowLedger::new(&mut store);
        ledger.append(payment.clone()).unwrap();
        let err = ledger.append(payment).unwrap_err();
        assert!(matches!(err, EscrowError::DuplicatePayment(_)));
        assert_eq!(ledger.pending_total(&merchant()).unwrap(), Decimal::new(5, 0));
    }

    #[test]
    fn append_with_commits_config_atomically() {
        let mut store = InMemoryStore::new();
        let config = MerchantConfig::for_tier(
            merchant(),
            Tier::Business,
            &MerchantDefaults::default(),
            Utc::now(),
        );
        let mut changes = Changeset::new();
        changes.put_merchant_config(config);

        store.fail_next_commit();
        let err = EscrowLedger::new(&mut store)
            .append_with(changes.clone(), PendingPayment::dummy(&merchant(), Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, EscrowError::Storage(_)));
        assert!(store.merchant_config(&merchant()).unwrap().is_none());

        EscrowLedger::new(&mut store)
            .append_with(changes, PendingPayment::dummy(&merchant(), Decimal::ONE))
            .unwrap();
        assert!(store.merchant_config(&merchant()).unwrap().is_some());
        assert!(store.escrow_account(&merchant()).unwrap().is_some());
    }

    #[test]
    fn pending_excludes_other_merchants_and_statuses() {
        let mut store = InMemoryStore::new();
        let mut ledger = EscrowLedger::new(&mut store);
        ledger
            .append(PendingPayment::dummy(&merchant(), Decimal::ONE))
            .unwrap();
        ledger
            .append(PendingPayment::dummy(&MerchantId::from("shop-2"), Decimal::TEN))
            .unwrap();
        assert_eq!(ledger.pending_total(&merchant()).unwrap(), Decimal::ONE);
    }

    #[test]
    fn read_only_view_lists_oldest_first() {
        let mut store = InMemoryStore::new();
        let now = Utc::now();
        let newer = PendingPayment::new(merchant(), "w", Decimal::TWO, "USDC", now).unwrap();
        let older = PendingPayment::new(
            merchant(),
            "w",
            Decimal::ONE,
            "USDC",
            now - chrono::Duration::minutes(5),
        )
        .unwrap();
        let mut ledger = EscrowLedger::new(&mut store);
        ledger.append(newer.clone()).unwrap();
        ledger.append(older.clone()).unwrap();

        let view = EscrowLedger::new(&store);
        let ids: Vec<_> = view
            .pending_by_merchant(&merchant())
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![older.id, newer.id]);
        assert_eq!(view.pending_total(&merchant()).unwrap(), Decimal::new(3, 0));
    }
}
