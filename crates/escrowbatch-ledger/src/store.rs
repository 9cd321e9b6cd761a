//! Storage abstraction for escrow state.
//!
//! The engine owns no global state: everything lives behind an
//! [`EscrowStore`] injected at construction. The store exposes four keyed
//! collections (merchant configs, payments, batches, escrow accounts) plus
//! the settlement config singleton.
//!
//! Reads are individual. Writes are grouped into a [`Changeset`] and applied
//! by [`EscrowStore::commit`], which must be all-or-nothing: either every
//! write lands or the store is unchanged.

use escrowbatch_types::{
    Batch, BatchId, EscrowAccount, MerchantConfig, MerchantId, PaymentId, PaymentStatus,
    PendingPayment, Result, SettlementConfig,
};

/// A single record write inside a [`Changeset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert or replace a merchant config.
    PutMerchantConfig(MerchantConfig),
    /// Insert a new payment. Fails if the id already exists.
    InsertPayment(PendingPayment),
    /// Replace an existing payment. Status may only move forward.
    UpdatePayment(PendingPayment),
    /// Insert a new batch. Fails if the id already exists.
    InsertBatch(Batch),
    /// Replace an existing batch. Status may only move forward and
    /// membership fields are immutable.
    UpdateBatch(Batch),
    /// Insert or replace a merchant's escrow account.
    PutAccount(EscrowAccount),
    /// Replace the settlement config singleton.
    PutSettlementConfig(SettlementConfig),
}

/// An ordered group of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    writes: Vec<Write>,
}

impl Changeset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_merchant_config(&mut self, config: MerchantConfig) -> &mut Self {
        self.writes.push(Write::PutMerchantConfig(config));
        self
    }

    pub fn insert_payment(&mut self, payment: PendingPayment) -> &mut Self {
        self.writes.push(Write::InsertPayment(payment));
        self
    }

    pub fn update_payment(&mut self, payment: PendingPayment) -> &mut Self {
        self.writes.push(Write::UpdatePayment(payment));
        self
    }

    pub fn insert_batch(&mut self, batch: Batch) -> &mut Self {
        self.writes.push(Write::InsertBatch(batch));
        self
    }

    pub fn update_batch(&mut self, batch: Batch) -> &mut Self {
        self.writes.push(Write::UpdateBatch(batch));
        self
    }

    pub fn put_account(&mut self, account: EscrowAccount) -> &mut Self {
        self.writes.push(Write::PutAccount(account));
        self
    }

    pub fn put_settlement_config(&mut self, config: SettlementConfig) -> &mut Self {
        self.writes.push(Write::PutSettlementConfig(config));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    #[must_use]
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Persistent keyed storage for escrow state.
///
/// Implementations may be in-memory, embedded KV, or remote. The only hard
/// requirement beyond the reads is that [`commit`](Self::commit) is atomic.
pub trait EscrowStore {
    // ------------------------------------------------------------------------
    // Merchant configs
    // ------------------------------------------------------------------------

    fn merchant_config(&self, merchant_id: &MerchantId) -> Result<Option<MerchantConfig>>;

    fn merchant_configs(&self) -> Result<Vec<MerchantConfig>>;

    // ------------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------------

    fn payment(&self, id: PaymentId) -> Result<Option<PendingPayment>>;

    /// All payments, in id order.
    fn payments(&self) -> Result<Vec<PendingPayment>>;

    fn payments_for_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<PendingPayment>> {
        Ok(self
            .payments()?
            .into_iter()
            .filter(|p| &p.merchant_id == merchant_id)
            .collect())
    }

    fn payments_with_status(
        &self,
        merchant_id: &MerchantId,
        status: PaymentStatus,
    ) -> Result<Vec<PendingPayment>> {
        Ok(self
            .payments_for_merchant(merchant_id)?
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    fn payments_in_batch(&self, batch_id: BatchId) -> Result<Vec<PendingPayment>> {
        Ok(self
            .payments()?
            .into_iter()
            .filter(|p| p.batch_id == Some(batch_id))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    fn batch(&self, id: BatchId) -> Result<Option<Batch>>;

    /// All batches, oldest first.
    fn batches(&self) -> Result<Vec<Batch>>;

    fn batches_for_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<Batch>> {
        Ok(self
            .batches()?
            .into_iter()
            .filter(|b| &b.merchant_id == merchant_id)
            .collect())
    }

    // ------------------------------------------------------------------------
    // Escrow accounts / settlement config
    // ------------------------------------------------------------------------

    fn escrow_account(&self, merchant_id: &MerchantId) -> Result<Option<EscrowAccount>>;

    fn settlement_config(&self) -> Result<Option<SettlementConfig>>;

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Apply every write in `changes`, or none of them.
    fn commit(&mut self, changes: Changeset) -> Result<()>;
}
