//! Per-merchant escrow account bookkeeping.
//!
//! `total_balance` is the sum of funds committed to batches that have not
//! yet left escrow. It goes up when a batch is created and down when the
//! batch settles (or its failure is written off). It can never go negative:
//! a release larger than the balance means the caller applied operations
//! out of order, so the result is clamped at zero and reported.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MerchantId, constants};

/// Running escrow balance for one merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub merchant_id: MerchantId,
    /// Stable reference of the escrow holding on the rail.
    pub escrow_ref: String,
    /// Funds committed to batches still held in escrow. Never negative.
    pub total_balance: Decimal,
    /// Batches still holding funds in escrow.
    pub pending_batch_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_settlement_at: Option<DateTime<Utc>>,
}

/// What a release actually did to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Release {
    /// The amount was larger than the balance; balance clamped to zero.
    pub balance_clamped: bool,
    /// The batch count was already zero.
    pub count_clamped: bool,
}

impl Release {
    /// Whether either counter would have gone negative.
    pub fn clamped(&self) -> bool {
        self.balance_clamped || self.count_clamped
    }
}

impl EscrowAccount {
    /// Open an empty account for `merchant_id`.
    #[must_use]
    pub fn open(merchant_id: MerchantId, now: DateTime<Utc>) -> Self {
        let escrow_ref = format!("{}:{merchant_id}", constants::ESCROW_REF_PREFIX);
        Self {
            merchant_id,
            escrow_ref,
            total_balance: Decimal::ZERO,
            pending_batch_count: 0,
            created_at: now,
            last_settlement_at: None,
        }
    }

    /// Commit a newly created batch's funds.
    pub fn commit_batch(&mut self, amount: Decimal) {
        self.total_balance += amount;
        self.pending_batch_count += 1;
    }

    /// Release a batch's funds, clamping both counters at zero.
    pub fn release_batch(&mut self, amount: Decimal) -> Release {
        let balance_clamped = amount > self.total_balance;
        self.total_balance = if balance_clamped {
            Decimal::ZERO
        } else {
            self.total_balance - amount
        };
        let count_clamped = self.pending_batch_count == 0;
        self.pending_batch_count = self.pending_batch_count.saturating_sub(1);
        Release {
            balance_clamped,
            count_clamped,
        }
    }

    /// Release a settled batch and stamp the settlement time.
    pub fn settle_batch(&mut self, amount: Decimal, now: DateTime<Utc>) -> Release {
        let release = self.release_batch(amount);
        self.last_settlement_at = Some(now);
        release
    }
}
