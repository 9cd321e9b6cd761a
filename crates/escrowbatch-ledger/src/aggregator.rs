//! Batch aggregator: decides when a merchant's pending payments become a
//! batch and writes the batch atomically.
//!
//! ## Trigger rules
//!
//! Evaluated in order against the merchant's `Pending` payments:
//! 1. batching disabled or nothing pending → no batch
//! 2. total below `min_batch_amount` → no batch
//! 3. total at or above `max_batch_amount` → batch now, any count
//! 4. otherwise at least `min_payment_count` payments → batch
//!
//! Frequency, day and time in the merchant config are not evaluated; the
//! payment count stands in for the schedule. Totals above the cap are not
//! split into several batches.

use std::fmt;

use chrono::{DateTime, Utc};
use escrowbatch_types::{
    Batch, EscrowAccount, EscrowError, MerchantConfig, MerchantId, PendingPayment, Result,
    constants,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{
    ledger::EscrowLedger,
    store::{Changeset, EscrowStore},
};

/// Why a batch was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTrigger {
    /// Pending total reached `max_batch_amount`.
    MaxAmountReached,
    /// Enough payments accumulated above `min_batch_amount`.
    PaymentCount,
}

impl fmt::Display for BatchTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxAmountReached => write!(f, "MAX_AMOUNT_REACHED"),
            Self::PaymentCount => write!(f, "PAYMENT_COUNT"),
        }
    }
}

/// Groups pending payments into batches.
#[derive(Debug, Clone)]
pub struct BatchAggregator {
    min_payment_count: usize,
}

impl Default for BatchAggregator {
    fn default() -> Self {
        Self::new(constants::MIN_PAYMENTS_PER_BATCH)
    }
}

impl BatchAggregator {
    #[must_use]
    pub fn new(min_payment_count: usize) -> Self {
        Self { min_payment_count }
    }

    #[must_use]
    pub fn min_payment_count(&self) -> usize {
        self.min_payment_count
    }

    /// Pure trigger evaluation over `pending`.
    #[must_use]
    pub fn evaluate(
        &self,
        config: &MerchantConfig,
        pending: &[PendingPayment],
    ) -> Option<BatchTrigger> {
        if !config.batching_enabled || pending.is_empty() {
            return None;
        }
        let total: Decimal = pending.iter().map(|p| p.amount).sum();
        if total < config.min_batch_amount {
            debug!(
                merchant = %config.merchant_id,
                %total,
                min = %config.min_batch_amount,
                "pending total below batch minimum"
            );
            return None;
        }
        if total >= config.max_batch_amount {
            if total > config.max_batch_amount {
                warn!(
                    merchant = %config.merchant_id,
                    %total,
                    max = %config.max_batch_amount,
                    "pending total exceeds batch maximum; batching it whole"
                );
            }
            return Some(BatchTrigger::MaxAmountReached);
        }
        if pending.len() >= self.min_payment_count {
            return Some(BatchTrigger::PaymentCount);
        }
        debug!(
            merchant = %config.merchant_id,
            count = pending.len(),
            needed = self.min_payment_count,
            "not enough pending payments for a batch"
        );
        None
    }

    /// Create a batch for `merchant_id` if the trigger rules say so.
    ///
    /// Settlement is not started here.
    ///
    /// # Errors
    /// Propagates store failures and [`create_batch`](Self::create_batch)
    /// errors. A missing merchant config is `Ok(None)`.
    pub fn maybe_create_batch<S: EscrowStore>(
        &self,
        store: &mut S,
        merchant_id: &MerchantId,
        now: DateTime<Utc>,
    ) -> Result<Option<Batch>> {
        let Some(config) = store.merchant_config(merchant_id)? else {
            return Ok(None);
        };
        let pending = EscrowLedger::new(&*store).pending_by_merchant(merchant_id)?;
        let Some(trigger) = self.evaluate(&config, &pending) else {
            return Ok(None);
        };
        let batch = self.create_batch(store, merchant_id, &pending, now)?;
        info!(batch = %batch.id, %trigger, "batch triggered");
        Ok(Some(batch))
    }

    /// Seal `pending` into a new batch and commit it in one write: the
    /// batch, every member moved to `Batched`, and the escrow account
    /// credited with the total.
    ///
    /// No thresholds are checked here.
    ///
    /// # Errors
    /// - `Internal` if `pending` is empty
    /// - `CurrencyMismatch` if members disagree on currency
    /// - `InvalidPaymentTransition` if a member is not `Pending`
    /// - `Storage` if the commit fails (nothing is written)
    pub fn create_batch<S: EscrowStore>(
        &self,
        store: &mut S,
        merchant_id: &MerchantId,
        pending: &[PendingPayment],
        now: DateTime<Utc>,
    ) -> Result<Batch> {
        if let Some(stranger) = pending.iter().find(|p| &p.merchant_id != merchant_id) {
            return Err(EscrowError::Internal(format!(
                "payment {} of {} offered to batch of {merchant_id}",
                stranger.id, stranger.merchant_id
            )));
        }
        let batch = Batch::seal(merchant_id.clone(), pending, now)?;

        let mut changes = Changeset::new();
        changes.insert_batch(batch.clone());
        for payment in pending {
            let mut member = payment.clone();
            member.mark_batched(batch.id)?;
            changes.update_payment(member);
        }

        let mut account = store
            .escrow_account(merchant_id)?
            .unwrap_or_else(|| EscrowAccount::open(merchant_id.clone(), now));
        account.commit_batch(batch.total_amount);
        let balance = account.total_balance;
        changes.put_account(account);

        store.commit(changes)?;

        info!(
            batch = %batch.id,
            merchant = %merchant_id,
            total = %batch.total_amount,
            count = batch.payment_count,
            membership = %batch.membership_hex(),
            escrow_balance = %balance,
            "batch created"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use escrowbatch_types::{BatchStatus, MerchantDefaults, PaymentStatus, Tier};

    fn merchant() -> MerchantId {
        MerchantId::from("shop-1")
    }

    fn setup(amounts: &[i64]) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        let config = MerchantConfig::for_tier(
            merchant(),
            Tier::Business,
            &MerchantDefaults::default(),
            Utc::now(),
        );
        let mut changes = Changeset::new();
        changes.put_merchant_config(config);
        store.commit(changes).unwrap();

        let mut ledger = EscrowLedger::new(&mut store);
        for amount in amounts {
            ledger
                .append(PendingPayment::dummy(&merchant(), Decimal::new(*amount, 0)))
                .unwrap();
        }
        store
    }

    #[test]
    fn three_payments_over_minimum_batch() {
        let mut store = setup(&[40, 40, 40]);
        let batch = BatchAggregator::default()
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap()
            .unwrap();

        assert_eq!(batch.total_amount, Decimal::new(120, 0));
        assert_eq!(batch.payment_count, 3);
        assert_eq!(batch.status, BatchStatus::Pending);

        let members = store.payments_in_batch(batch.id).unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|p| p.status == PaymentStatus::Batched));
        batch.verify_members(&members).unwrap();

        let account = store.escrow_account(&merchant()).unwrap().unwrap();
        assert_eq!(account.total_balance, Decimal::new(120, 0));
        assert_eq!(account.pending_batch_count, 1);
    }

    #[test]
    fn max_amount_batches_single_payment() {
        let mut store = setup(&[10_000]);
        let batch = BatchAggregator::default()
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(batch.payment_count, 1);
        assert_eq!(batch.total_amount, Decimal::new(10_000, 0));
    }

    #[test]
    fn over_cap_total_is_not_split() {
        let mut store = setup(&[9_000, 4_000]);
        let batch = BatchAggregator::default()
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(batch.total_amount, Decimal::new(13_000, 0));
        assert_eq!(store.batch_count(), 1);
    }

    #[test]
    fn below_minimum_no_batch() {
        let mut store = setup(&[30, 30, 30]);
        let result = BatchAggregator::default()
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.batch_count(), 0);
    }

    #[test]
    fn two_payments_wait_for_third() {
        let mut store = setup(&[60, 60]);
        let aggregator = BatchAggregator::default();
        assert!(
            aggregator
                .maybe_create_batch(&mut store, &merchant(), Utc::now())
                .unwrap()
                .is_none()
        );

        EscrowLedger::new(&mut store)
            .append(PendingPayment::dummy(&merchant(), Decimal::new(5, 0)))
            .unwrap();
        let batch = aggregator
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(batch.payment_count, 3);
    }

    #[test]
    fn disabled_batching_no_batch() {
        let mut store = setup(&[500, 500, 500]);
        let mut config = store.merchant_config(&merchant()).unwrap().unwrap();
        config.batching_enabled = false;
        let mut changes = Changeset::new();
        changes.put_merchant_config(config);
        store.commit(changes).unwrap();

        assert!(
            BatchAggregator::default()
                .maybe_create_batch(&mut store, &merchant(), Utc::now())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unknown_merchant_no_batch() {
        let mut store = InMemoryStore::new();
        assert!(
            BatchAggregator::default()
                .maybe_create_batch(&mut store, &MerchantId::from("ghost"), Utc::now())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn batched_payments_are_not_rebatched() {
        let mut store = setup(&[40, 40, 40]);
        let aggregator = BatchAggregator::default();
        aggregator
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap()
            .unwrap();
        assert!(
            aggregator
                .maybe_create_batch(&mut store, &merchant(), Utc::now())
                .unwrap()
                .is_none()
        );
        assert_eq!(store.batch_count(), 1);
    }

    #[test]
    fn failed_commit_leaves_payments_pending() {
        let mut store = setup(&[40, 40, 40]);
        store.fail_next_commit();
        let err = BatchAggregator::default()
            .maybe_create_batch(&mut store, &merchant(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EscrowError::Storage(_)));
        assert_eq!(store.batch_count(), 0);
        assert_eq!(
            store
                .payments_with_status(&merchant(), PaymentStatus::Pending)
                .unwrap()
                .len(),
            3
        );
        let account = store.escrow_account(&merchant()).unwrap().unwrap();
        assert_eq!(account.total_balance, Decimal::ZERO);
    }

    #[test]
    fn custom_payment_count() {
        let config = MerchantConfig::for_tier(
            merchant(),
            Tier::Enterprise,
            &MerchantDefaults::default(),
            Utc::now(),
        );
        let pending: Vec<_> = (0..4)
            .map(|_| PendingPayment::dummy(&merchant(), Decimal::new(50, 0)))
            .collect();
        assert_eq!(BatchAggregator::new(5).evaluate(&config, &pending), None);
        assert_eq!(
            BatchAggregator::new(4).evaluate(&config, &pending),
            Some(BatchTrigger::PaymentCount)
        );
    }

    #[test]
    fn create_batch_rejects_empty() {
        let mut store = setup(&[]);
        let err = BatchAggregator::default()
            .create_batch(&mut store, &merchant(), &[], Utc::now())
            .unwrap_err();
        assert!(matches!(err, EscrowError::Internal(_)));
    }
}
