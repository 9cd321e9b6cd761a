//! The EscrowBatch engine facade.
//!
//! Owns the injected store and connector and exposes every external
//! operation. Each operation runs to completion on `&mut self`; there is no
//! internal parallelism and no global state.
//!
//! Boolean operations follow one convention: domain rejections (not found,
//! wrong state, paused, connector failure, invalid config) are logged and
//! reported as `Ok(false)`; only storage faults surface as `Err`.

use chrono::{DateTime, Utc};
use escrowbatch_ledger::{BatchAggregator, Changeset, EscrowLedger, EscrowStore};
use escrowbatch_settlement::{
    SettlementConnector, SettlementExecutor, expire_stuck_settlements, verify_batch_integrity,
    verify_escrow_balance,
};
use escrowbatch_types::{
    Batch, BatchId, BatchingMetrics, EngineConfig, EscrowAccount, EscrowError, MerchantConfig,
    MerchantConfigUpdate, MerchantDefaults, MerchantId, PaymentId, PendingPayment, Result,
    SettlementConfig, SettlementConfigUpdate, TierClassifier, constants,
};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::metrics::MetricsReporter;

/// How a submitted payment was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Free tier: paid straight to the merchant.
    DirectSettled { payment_id: PaymentId, tx_ref: String },
    /// Business / Enterprise: held in escrow for batching.
    EscrowBatched { payment_id: PaymentId },
}

impl SubmitOutcome {
    #[must_use]
    pub fn payment_id(&self) -> PaymentId {
        match self {
            Self::DirectSettled { payment_id, .. } | Self::EscrowBatched { payment_id } => {
                *payment_id
            }
        }
    }
}

/// Result of a forced batch creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Created(BatchId),
    NoPendingPayments,
    MerchantNotFound,
}

/// Tier-routed escrow batching engine over an injected store and connector.
pub struct EscrowBatchEngine<S, C> {
    store: S,
    executor: SettlementExecutor<C>,
    aggregator: BatchAggregator,
    tiers: TierClassifier,
    merchant_defaults: MerchantDefaults,
}

impl<S: EscrowStore, C: SettlementConnector> EscrowBatchEngine<S, C> {
    /// Build an engine. Writes `config.settlement` to the store if the
    /// store has no settlement config yet; an existing one is kept.
    ///
    /// # Errors
    /// - `Configuration` if `config` is invalid
    /// - `Storage` if the initial write fails
    pub fn new(mut store: S, connector: C, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if store.settlement_config()?.is_none() {
            let mut changes = Changeset::new();
            changes.put_settlement_config(config.settlement.clone());
            store.commit(changes)?;
            info!(
                max_cost = config.settlement.max_settlement_cost,
                retry_attempts = config.settlement.retry_attempts,
                timeout_secs = config.settlement.settlement_timeout.as_secs(),
                "settlement config initialised"
            );
        }
        info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            connector = connector.name(),
            min_payments_per_batch = config.min_payments_per_batch,
            "escrow batch engine ready"
        );
        Ok(Self {
            store,
            executor: SettlementExecutor::new(connector),
            aggregator: BatchAggregator::new(config.min_payments_per_batch),
            tiers: config.tiers,
            merchant_defaults: config.merchant_defaults,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn connector(&self) -> &C {
        self.executor.connector()
    }

    /// Consume the engine, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    // ------------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------------

    /// Route a payment by the tier of `credential`.
    ///
    /// Free tier settles directly and is recorded SETTLED; nothing enters the
    /// pending set and no escrow account is opened. Paid tiers append to the
    /// escrow ledger and then run the batch trigger (and auto-settle).
    ///
    /// A merchant seen for the first time gets a tier-derived config,
    /// committed together with the payment.
    ///
    /// # Errors
    /// - `InvalidAmount` unless `amount > 0`
    /// - `CurrencyMismatch` if an escrow payment is not in the merchant's
    ///   settlement currency
    /// - `SettlementPaused`, `ConnectorFailure` on the direct path
    /// - `Storage` if the payment could not be recorded, or if the batch
    ///   trigger or auto-settle hit a storage fault after it was
    pub fn submit_payment(
        &mut self,
        merchant_id: &MerchantId,
        wallet: &str,
        amount: Decimal,
        currency: &str,
        credential: &str,
    ) -> Result<SubmitOutcome> {
        let now = Utc::now();
        let tier = self.tiers.classify(credential);
        let payment = PendingPayment::new(merchant_id.clone(), wallet, amount, currency, now)?;

        let mut changes = Changeset::new();
        let config = if let Some(config) = self.store.merchant_config(merchant_id)? {
            config
        } else {
            let config =
                MerchantConfig::for_tier(merchant_id.clone(), tier, &self.merchant_defaults, now);
            changes.put_merchant_config(config.clone());
            info!(merchant = %merchant_id, %tier, "merchant registered");
            config
        };

        if !tier.uses_escrow() {
            let settled = self.executor.settle_direct(&mut self.store, payment, changes)?;
            return Ok(SubmitOutcome::DirectSettled {
                payment_id: settled.id,
                tx_ref: settled.tx_ref.unwrap_or_default(),
            });
        }

        if payment.currency != config.currency {
            return Err(EscrowError::CurrencyMismatch {
                expected: config.currency,
                actual: payment.currency,
            });
        }
        let payment_id = EscrowLedger::new(&mut self.store).append_with(changes, payment)?;
        info!(payment = %payment_id, merchant = %merchant_id, %tier, %amount, "payment escrowed");

        // The payment is recorded; a rejected trigger is retried by the next one.
        match self.maybe_create_batch(merchant_id) {
            Ok(_) => {}
            Err(e) if e.is_rejection() => {
                warn!(
                    merchant = %merchant_id,
                    error = %e,
                    "batch trigger rejected after escrow append"
                );
            }
            Err(e) => {
                error!(
                    merchant = %merchant_id,
                    error = %e,
                    "batch trigger failed after escrow append"
                );
                return Err(e);
            }
        }
        Ok(SubmitOutcome::EscrowBatched { payment_id })
    }

    pub fn get_payment(&self, payment_id: PaymentId) -> Result<Option<PendingPayment>> {
        self.store.payment(payment_id)
    }

    pub fn get_payments_for_batch(&self, batch_id: BatchId) -> Result<Vec<PendingPayment>> {
        self.store.payments_in_batch(batch_id)
    }

    /// The merchant's payments still waiting for a batch, oldest first.
    pub fn get_pending_payments(&self, merchant_id: &MerchantId) -> Result<Vec<PendingPayment>> {
        EscrowLedger::new(&self.store).pending_by_merchant(merchant_id)
    }

    // ------------------------------------------------------------------------
    // Merchant configs
    // ------------------------------------------------------------------------

    /// # Errors
    /// Returns `MerchantNotFound` if the merchant has never been seen.
    pub fn get_merchant_config(&self, merchant_id: &MerchantId) -> Result<MerchantConfig> {
        self.store
            .merchant_config(merchant_id)?
            .ok_or_else(|| EscrowError::MerchantNotFound(merchant_id.clone()))
    }

    /// Apply a partial config update. `Ok(false)` if the merchant is unknown
    /// or the result would be invalid; the stored config is then unchanged.
    pub fn update_merchant_config(
        &mut self,
        merchant_id: &MerchantId,
        update: &MerchantConfigUpdate,
    ) -> Result<bool> {
        let Some(mut config) = self.store.merchant_config(merchant_id)? else {
            warn!(merchant = %merchant_id, "config update for unknown merchant");
            return Ok(false);
        };
        if let Err(e) = config.apply(update, Utc::now()) {
            warn!(merchant = %merchant_id, error = %e, "merchant config update rejected");
            return Ok(false);
        }
        let mut changes = Changeset::new();
        changes.put_merchant_config(config);
        self.store.commit(changes)?;
        info!(merchant = %merchant_id, "merchant config updated");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------------

    /// Run the batch trigger for `merchant_id`; auto-settle a new batch if
    /// the merchant config asks for it.
    ///
    /// Returns the created batch in its post-settlement state. Settlement
    /// rejections and connector failures are logged, not returned.
    pub fn maybe_create_batch(&mut self, merchant_id: &MerchantId) -> Result<Option<Batch>> {
        let Some(batch) =
            self.aggregator
                .maybe_create_batch(&mut self.store, merchant_id, Utc::now())?
        else {
            return Ok(None);
        };
        self.auto_settle(batch).map(Some)
    }

    /// Batch every pending payment of the merchant, ignoring thresholds.
    /// Auto-settle is honoured.
    pub fn trigger_batch_creation(&mut self, merchant_id: &MerchantId) -> Result<TriggerOutcome> {
        if self.store.merchant_config(merchant_id)?.is_none() {
            warn!(merchant = %merchant_id, "forced batch for unknown merchant");
            return Ok(TriggerOutcome::MerchantNotFound);
        }
        let pending = EscrowLedger::new(&self.store).pending_by_merchant(merchant_id)?;
        if pending.is_empty() {
            return Ok(TriggerOutcome::NoPendingPayments);
        }
        let batch = self
            .aggregator
            .create_batch(&mut self.store, merchant_id, &pending, Utc::now())?;
        info!(batch = %batch.id, merchant = %merchant_id, "batch forced");
        let batch = self.auto_settle(batch)?;
        Ok(TriggerOutcome::Created(batch.id))
    }

    fn auto_settle(&mut self, batch: Batch) -> Result<Batch> {
        let auto = self
            .store
            .merchant_config(&batch.merchant_id)?
            .is_some_and(|c| c.auto_settle);
        if !auto {
            return Ok(batch);
        }
        match self.executor.settle(&mut self.store, batch.id, Utc::now()) {
            Ok(settled) => Ok(settled),
            Err(e) if e.is_rejection() => {
                warn!(batch = %batch.id, error = %e, "auto-settle did not complete");
                Ok(self.store.batch(batch.id)?.unwrap_or(batch))
            }
            Err(e) => Err(e),
        }
    }

    /// The merchant's batches, oldest first.
    pub fn get_batches_for_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<Batch>> {
        let mut batches = self.store.batches_for_merchant(merchant_id)?;
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(batches)
    }

    pub fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        self.store.batch(batch_id)
    }

    /// Recompute count, total and membership hash of a batch from its
    /// stored members.
    ///
    /// # Errors
    /// `BatchNotFound` or `BatchIntegrityViolation`.
    pub fn verify_batch_integrity(&self, batch_id: BatchId) -> Result<Batch> {
        verify_batch_integrity(&self.store, batch_id)
    }

    // ------------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------------

    /// Settle a PENDING batch. `Ok(false)` if the batch is missing, not
    /// PENDING, settlement is paused, or the connector failed.
    pub fn settle_batch(&mut self, batch_id: BatchId) -> Result<bool> {
        match self.executor.settle(&mut self.store, batch_id, Utc::now()) {
            Ok(_) => Ok(true),
            Err(e) if e.is_rejection() => {
                warn!(batch = %batch_id, error = %e, "settle rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Release a FAILED batch's escrow and fail its payments. `Ok(false)`
    /// if the batch is missing, not FAILED, or already abandoned.
    pub fn abandon_failed_batch(&mut self, batch_id: BatchId) -> Result<bool> {
        match self
            .executor
            .abandon_failed_batch(&mut self.store, batch_id, Utc::now())
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_rejection() => {
                warn!(batch = %batch_id, error = %e, "abandon rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Fail batches stuck in PROCESSING past the settlement timeout.
    pub fn expire_stuck_settlements(&mut self, now: DateTime<Utc>) -> Result<Vec<BatchId>> {
        expire_stuck_settlements(&mut self.store, now)
    }

    pub fn get_settlement_config(&self) -> Result<SettlementConfig> {
        Ok(self.store.settlement_config()?.unwrap_or_default())
    }

    /// Set the emergency pause. Every settlement is refused until resumed.
    pub fn pause_settlement(&mut self) -> Result<()> {
        self.set_pause(true)
    }

    pub fn resume_settlement(&mut self) -> Result<()> {
        self.set_pause(false)
    }

    fn set_pause(&mut self, paused: bool) -> Result<()> {
        let mut config = self.get_settlement_config()?;
        config.emergency_pause = paused;
        let mut changes = Changeset::new();
        changes.put_settlement_config(config);
        self.store.commit(changes)?;
        if paused {
            warn!("settlement emergency pause engaged");
        } else {
            info!("settlement resumed");
        }
        Ok(())
    }

    /// Apply a partial settlement config update. `Ok(false)` if the
    /// resulting timeout is zero or out of range.
    pub fn update_settlement_config(&mut self, update: &SettlementConfigUpdate) -> Result<bool> {
        let mut config = self.get_settlement_config()?;
        config.apply(update);
        if let Err(e) = config.validate() {
            warn!(error = %e, "settlement config update rejected");
            return Ok(false);
        }
        let mut changes = Changeset::new();
        changes.put_settlement_config(config);
        self.store.commit(changes)?;
        info!("settlement config updated");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Escrow accounts / reporting
    // ------------------------------------------------------------------------

    /// Committed escrow balance; zero when the merchant has no account.
    pub fn get_escrow_balance(&self, merchant_id: &MerchantId) -> Result<Decimal> {
        Ok(self
            .store
            .escrow_account(merchant_id)?
            .map_or(Decimal::ZERO, |a| a.total_balance))
    }

    pub fn get_escrow_account(&self, merchant_id: &MerchantId) -> Result<Option<EscrowAccount>> {
        self.store.escrow_account(merchant_id)
    }

    /// Check the merchant's account against the batches it holds.
    ///
    /// # Errors
    /// `EscrowInvariantViolation` on mismatch.
    pub fn verify_escrow_balance(&self, merchant_id: &MerchantId) -> Result<()> {
        verify_escrow_balance(&self.store, merchant_id)
    }

    pub fn get_metrics(&self) -> Result<BatchingMetrics> {
        MetricsReporter::snapshot(&self.store)
    }
}
