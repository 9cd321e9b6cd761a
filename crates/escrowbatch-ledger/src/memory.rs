//! In-memory [`EscrowStore`].
//!
//! Fast and deterministic (ordered maps), non-persistent. Used by tests and
//! by embedders that snapshot state themselves.
//!
//! `commit` validates the whole changeset against current state before
//! touching anything, so a rejected changeset leaves the store unchanged.

use std::collections::{BTreeMap, HashMap};

use escrowbatch_types::{
    Batch, BatchId, EscrowAccount, EscrowError, MerchantConfig, MerchantId, PaymentId,
    PendingPayment, Result, SettlementConfig,
};

use crate::store::{Changeset, EscrowStore, Write};

/// Ordered in-memory storage for all escrow collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    merchant_configs: BTreeMap<MerchantId, MerchantConfig>,
    payments: BTreeMap<PaymentId, PendingPayment>,
    batches: BTreeMap<BatchId, Batch>,
    accounts: BTreeMap<MerchantId, EscrowAccount>,
    settlement_config: Option<SettlementConfig>,
    /// Test hook: commits left to succeed before one fails.
    fail_commit_after: Option<usize>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    /// Number of stored batches.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Make the next `commit` fail without applying anything.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_next_commit(&mut self) {
        self.fail_commit_after(0);
    }

    /// Let `successes` commits through, then fail the one after them.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_commit_after(&mut self, successes: usize) {
        self.fail_commit_after = Some(successes);
    }

    /// Check every write against current state plus the writes before it.
    fn validate(&self, changes: &Changeset) -> Result<()> {
        let mut staged_payments: HashMap<PaymentId, &PendingPayment> = HashMap::new();
        let mut staged_batches: HashMap<BatchId, &Batch> = HashMap::new();

        for write in changes.iter() {
            match write {
                Write::InsertPayment(p) => {
                    if self.payments.contains_key(&p.id) || staged_payments.contains_key(&p.id) {
                        return Err(EscrowError::DuplicatePayment(p.id));
                    }
                    staged_payments.insert(p.id, p);
                }
                Write::UpdatePayment(p) => {
                    let current = staged_payments
                        .get(&p.id)
                        .copied()
                        .or_else(|| self.payments.get(&p.id))
                        .ok_or(EscrowError::PaymentNotFound(p.id))?;
                    check_payment_update(current, p)?;
                    staged_payments.insert(p.id, p);
                }
                Write::InsertBatch(b) => {
                    if self.batches.contains_key(&b.id) || staged_batches.contains_key(&b.id) {
                        return Err(EscrowError::DuplicateBatch(b.id));
                    }
                    staged_batches.insert(b.id, b);
                }
                Write::UpdateBatch(b) => {
                    let current = staged_batches
                        .get(&b.id)
                        .copied()
                        .or_else(|| self.batches.get(&b.id))
                        .ok_or(EscrowError::BatchNotFound(b.id))?;
                    check_batch_update(current, b)?;
                    staged_batches.insert(b.id, b);
                }
                Write::PutMerchantConfig(_)
                | Write::PutAccount(_)
                | Write::PutSettlementConfig(_) => {}
            }
        }
        Ok(())
    }
}

/// Payments only move forward and never change identity, amount or batch.
fn check_payment_update(current: &PendingPayment, next: &PendingPayment) -> Result<()> {
    if current.status != next.status && !current.status.can_transition_to(next.status) {
        return Err(EscrowError::InvalidPaymentTransition {
            id: next.id,
            from: current.status,
            to: next.status,
        });
    }
    let rebound = current.batch_id.is_some() && current.batch_id != next.batch_id;
    if rebound || current.amount != next.amount || current.merchant_id != next.merchant_id {
        return Err(EscrowError::Storage(format!(
            "immutable fields of payment {} changed",
            next.id
        )));
    }
    Ok(())
}

/// Batches only move forward and never change membership.
fn check_batch_update(current: &Batch, next: &Batch) -> Result<()> {
    if current.status != next.status && !current.status.can_transition_to(next.status) {
        return Err(EscrowError::InvalidBatchTransition {
            id: next.id,
            from: current.status,
            to: next.status,
        });
    }
    if current.total_amount != next.total_amount
        || current.payment_count != next.payment_count
        || current.membership_hash != next.membership_hash
        || current.merchant_id != next.merchant_id
    {
        return Err(EscrowError::BatchIntegrityViolation {
            reason: format!("membership of {} changed after creation", next.id),
        });
    }
    Ok(())
}

impl EscrowStore for InMemoryStore {
    fn merchant_config(&self, merchant_id: &MerchantId) -> Result<Option<MerchantConfig>> {
        Ok(self.merchant_configs.get(merchant_id).cloned())
    }

    fn merchant_configs(&self) -> Result<Vec<MerchantConfig>> {
        Ok(self.merchant_configs.values().cloned().collect())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<PendingPayment>> {
        Ok(self.payments.get(&id).cloned())
    }

    fn payments(&self) -> Result<Vec<PendingPayment>> {
        Ok(self.payments.values().cloned().collect())
    }

    fn batch(&self, id: BatchId) -> Result<Option<Batch>> {
        Ok(self.batches.get(&id).cloned())
    }

    fn batches(&self) -> Result<Vec<Batch>> {
        Ok(self.batches.values().cloned().collect())
    }

    fn escrow_account(&self, merchant_id: &MerchantId) -> Result<Option<EscrowAccount>> {
        Ok(self.accounts.get(merchant_id).cloned())
    }

    fn settlement_config(&self) -> Result<Option<SettlementConfig>> {
        Ok(self.settlement_config.clone())
    }

    fn commit(&mut self, changes: Changeset) -> Result<()> {
        match self.fail_commit_after.take() {
            Some(0) => return Err(EscrowError::Storage("injected commit failure".to_string())),
            Some(left) => self.fail_commit_after = Some(left - 1),
            None => {}
        }
        self.validate(&changes)?;

        for write in changes.into_writes() {
            match write {
                Write::PutMerchantConfig(c) => {
                    self.merchant_configs.insert(c.merchant_id.clone(), c);
                }
                Write::InsertPayment(p) | Write::UpdatePayment(p) => {
                    self.payments.insert(p.id, p);
                }
                Write::InsertBatch(b) | Write::UpdateBatch(b) => {
                    self.batches.insert(b.id, b);
                }
                Write::PutAccount(a) => {
                    self.accounts.insert(a.merchant_id.clone(), a);
                }
                Write::PutSettlementConfig(c) => {
                    self.settlement_config = Some(c);
                }
            }
        }
        Ok(())
    }
}
