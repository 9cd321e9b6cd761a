//! Settlement executor: drives a batch through
//! `PENDING → PROCESSING → {SETTLED, FAILED}` and applies the outcome to the
//! member payments and the merchant's escrow account.
//!
//! ## Settle
//!
//! 1. Reject (mutating nothing) if the batch is missing, not PENDING, the
//!    settlement config is paused, or its members fail verification
//! 2. Commit PROCESSING before the connector is called, so a re-entrant
//!    call for the same batch is rejected by step 1
//! 3. Call the connector
//! 4. Success: batch SETTLED, members SETTLED with the batch tx_ref,
//!    account released, all in one write
//! 5. Failure: batch FAILED with the reason; members stay BATCHED and the
//!    account keeps the funds until the batch is abandoned
//!
//! There is no automatic retry.

use chrono::{DateTime, Utc};
use escrowbatch_ledger::{Changeset, EscrowStore};
use escrowbatch_types::{
    Batch, BatchId, BatchStatus, EscrowAccount, EscrowError, MerchantId, PaymentStatus,
    PendingPayment, Result, SettlementConfig, SettlementRequest, SettlementTarget,
};
use tracing::{error, info, warn};

use crate::connector::SettlementConnector;

/// Runs settlements through a [`SettlementConnector`].
#[derive(Debug)]
pub struct SettlementExecutor<C> {
    connector: C,
}

impl<C: SettlementConnector> SettlementExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Settle a PENDING batch.
    ///
    /// Returns the batch in its final SETTLED state.
    ///
    /// # Errors
    /// - `BatchNotFound`, `InvalidBatchState`, `SettlementPaused`,
    ///   `BatchIntegrityViolation`: nothing was mutated
    /// - `ConnectorFailure`: the batch is now FAILED
    /// - `Storage`: a commit failed
    pub fn settle<S: EscrowStore>(
        &self,
        store: &mut S,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<Batch> {
        let mut batch = store
            .batch(batch_id)?
            .ok_or(EscrowError::BatchNotFound(batch_id))?;
        if batch.status != BatchStatus::Pending {
            return Err(EscrowError::InvalidBatchState {
                id: batch_id,
                status: batch.status,
                expected: BatchStatus::Pending,
            });
        }
        let config = settlement_config(store)?;
        if config.emergency_pause {
            return Err(EscrowError::SettlementPaused);
        }
        let members = store.payments_in_batch(batch_id)?;
        batch.verify_members(&members)?;

        batch.mark_processing(now)?;
        let mut changes = Changeset::new();
        changes.update_batch(batch.clone());
        store.commit(changes)?;
        info!(batch = %batch_id, merchant = %batch.merchant_id, "batch processing");

        let request = SettlementRequest::new(
            SettlementTarget::Batch(batch_id),
            batch.merchant_id.clone(),
            batch.currency.clone(),
            batch.total_amount,
            members.iter().map(|p| p.id).collect(),
            &config,
        );

        match self.connector.settle(&request) {
            Ok(receipt) => {
                batch.mark_settled(&receipt, now)?;

                let mut changes = Changeset::new();
                changes.update_batch(batch.clone());
                for mut member in members {
                    member.mark_settled(&receipt.tx_ref)?;
                    changes.update_payment(member);
                }
                let mut account = load_account(store, &batch.merchant_id, now)?;
                if account.settle_batch(batch.total_amount, now).clamped() {
                    error!(
                        batch = %batch_id,
                        merchant = %batch.merchant_id,
                        total = %batch.total_amount,
                        "escrow account would go negative on settlement; clamped at zero"
                    );
                }
                let remaining = account.total_balance;
                changes.put_account(account);

                if let Err(e) = store.commit(changes) {
                    error!(
                        batch = %batch_id,
                        tx_ref = %receipt.tx_ref,
                        error = %e,
                        "settlement succeeded on the rail but could not be recorded"
                    );
                    return Err(e);
                }
                info!(
                    batch = %batch_id,
                    merchant = %batch.merchant_id,
                    tx_ref = %receipt.tx_ref,
                    cost_units = receipt.cost_units,
                    cost = %receipt.cost,
                    connector = self.connector.name(),
                    escrow_balance = %remaining,
                    "batch settled"
                );
                Ok(batch)
            }
            Err(failure) => {
                batch.mark_failed(failure.reason.clone())?;
                let mut changes = Changeset::new();
                changes.update_batch(batch);
                store.commit(changes)?;
                warn!(
                    batch = %batch_id,
                    reason = %failure,
                    connector = self.connector.name(),
                    "batch settlement failed"
                );
                Err(EscrowError::ConnectorFailure {
                    reason: failure.reason,
                })
            }
        }
    }

    /// Pay a fresh payment straight to the merchant and record it SETTLED.
    ///
    /// Nothing is recorded unless the connector succeeds.
    ///
    /// # Errors
    /// - `SettlementPaused` if the settlement config is paused
    /// - `InvalidPaymentTransition` if `payment` is not a fresh PENDING one
    /// - `ConnectorFailure` if the transfer failed
    /// - `DuplicatePayment`, `Storage` from the commit
    pub fn settle_direct<S: EscrowStore>(
        &self,
        store: &mut S,
        mut payment: PendingPayment,
        mut changes: Changeset,
    ) -> Result<PendingPayment> {
        if payment.status != PaymentStatus::Pending || payment.batch_id.is_some() {
            return Err(EscrowError::InvalidPaymentTransition {
                id: payment.id,
                from: payment.status,
                to: PaymentStatus::Settled,
            });
        }
        let config = settlement_config(store)?;
        if config.emergency_pause {
            return Err(EscrowError::SettlementPaused);
        }

        let request = SettlementRequest::new(
            SettlementTarget::Direct(payment.id),
            payment.merchant_id.clone(),
            payment.currency.clone(),
            payment.amount,
            vec![payment.id],
            &config,
        );
        let receipt = self.connector.settle(&request).map_err(|failure| {
            warn!(
                payment = %payment.id,
                reason = %failure,
                connector = self.connector.name(),
                "direct settlement failed"
            );
            EscrowError::ConnectorFailure {
                reason: failure.reason,
            }
        })?;

        payment.settle_direct(receipt.tx_ref.clone())?;
        changes.insert_payment(payment.clone());
        store.commit(changes)?;
        info!(
            payment = %payment.id,
            merchant = %payment.merchant_id,
            amount = %payment.amount,
            tx_ref = %receipt.tx_ref,
            "payment settled directly"
        );
        Ok(payment)
    }

    /// Give up on a FAILED batch: members become FAILED and the merchant's
    /// escrow commitment for the batch is released.
    ///
    /// # Errors
    /// - `BatchNotFound`
    /// - `InvalidBatchState` unless the batch is FAILED
    /// - `BatchAlreadyAbandoned` on a second call
    /// - `Storage` if the commit fails
    pub fn abandon_failed_batch<S: EscrowStore>(
        &self,
        store: &mut S,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<Batch> {
        let mut batch = store
            .batch(batch_id)?
            .ok_or(EscrowError::BatchNotFound(batch_id))?;
        batch.mark_abandoned(now)?;

        let mut changes = Changeset::new();
        changes.update_batch(batch.clone());
        for mut member in store.payments_in_batch(batch_id)? {
            member.mark_failed()?;
            changes.update_payment(member);
        }
        let mut account = load_account(store, &batch.merchant_id, now)?;
        if account.release_batch(batch.total_amount).clamped() {
            error!(
                batch = %batch_id,
                merchant = %batch.merchant_id,
                total = %batch.total_amount,
                "escrow account would go negative on abandon; clamped at zero"
            );
        }
        changes.put_account(account);
        store.commit(changes)?;

        info!(
            batch = %batch_id,
            merchant = %batch.merchant_id,
            released = %batch.total_amount,
            "failed batch abandoned"
        );
        Ok(batch)
    }
}

/// The stored settlement config, or the default when none was written yet.
pub(crate) fn settlement_config<S: EscrowStore>(store: &S) -> Result<SettlementConfig> {
    Ok(store.settlement_config()?.unwrap_or_default())
}

fn load_account<S: EscrowStore>(
    store: &S,
    merchant_id: &MerchantId,
    now: DateTime<Utc>,
) -> Result<EscrowAccount> {
    Ok(match store.escrow_account(merchant_id)? {
        Some(account) => account,
        None => {
            error!(merchant = %merchant_id, "batch without escrow account; opening one");
            EscrowAccount::open(merchant_id.clone(), now)
        }
    })
}
