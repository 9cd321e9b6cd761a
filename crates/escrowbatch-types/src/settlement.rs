//! Settlement configuration and the connector contract types.
//!
//! The payment rail itself is external. The engine hands it a
//! [`SettlementRequest`] and expects back either a [`SettlementReceipt`]
//! or a [`ConnectorFailure`].

use std::{fmt, time::Duration};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, EscrowError, MerchantId, PaymentId, Result, constants};

/// Process-wide settlement controls. Stored as a singleton record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Highest cost, in rail cost units, the rail may spend on one transfer.
    pub max_settlement_cost: u64,
    pub priority_fee: u64,
    /// Attempt budget the rail may use inside one transfer.
    pub retry_attempts: u32,
    /// How long a batch may sit in PROCESSING before it is failed.
    pub settlement_timeout: Duration,
    /// Refuse every settlement while set.
    pub emergency_pause: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_settlement_cost: constants::DEFAULT_MAX_SETTLEMENT_COST,
            priority_fee: constants::DEFAULT_PRIORITY_FEE,
            retry_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            settlement_timeout: Duration::from_secs(constants::DEFAULT_SETTLEMENT_TIMEOUT_SECS),
            emergency_pause: false,
        }
    }
}

impl SettlementConfig {
    /// # Errors
    /// Returns `Configuration` if the timeout is zero or longer than
    /// [`constants::MAX_SETTLEMENT_TIMEOUT_SECS`].
    pub fn validate(&self) -> Result<()> {
        if self.settlement_timeout.is_zero() {
            return Err(EscrowError::Configuration(
                "settlement_timeout must be > 0".to_string(),
            ));
        }
        if self.settlement_timeout.as_secs() > constants::MAX_SETTLEMENT_TIMEOUT_SECS {
            return Err(EscrowError::Configuration(format!(
                "settlement_timeout must be <= {}s",
                constants::MAX_SETTLEMENT_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    /// Apply a partial update.
    pub fn apply(&mut self, update: &SettlementConfigUpdate) {
        if let Some(cost) = update.max_settlement_cost {
            self.max_settlement_cost = cost;
        }
        if let Some(fee) = update.priority_fee {
            self.priority_fee = fee;
        }
        if let Some(attempts) = update.retry_attempts {
            self.retry_attempts = attempts;
        }
        if let Some(timeout) = update.settlement_timeout {
            self.settlement_timeout = timeout;
        }
    }
}

/// Partial update of a [`SettlementConfig`]. The pause flag has its own
/// pause/resume operations and is not part of this update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfigUpdate {
    pub max_settlement_cost: Option<u64>,
    pub priority_fee: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub settlement_timeout: Option<Duration>,
}

/// What a transfer settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementTarget {
    /// An aggregated escrow batch.
    Batch(BatchId),
    /// A single Free-tier payment, paid straight to the merchant.
    Direct(PaymentId),
}

impl fmt::Display for SettlementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch(id) => write!(f, "{id}"),
            Self::Direct(id) => write!(f, "direct:{id}"),
        }
    }
}

/// One transfer request handed to the settlement connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub target: SettlementTarget,
    pub merchant_id: MerchantId,
    pub currency: String,
    pub amount: Decimal,
    pub payment_ids: Vec<PaymentId>,
    pub max_cost: u64,
    pub priority_fee: u64,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl SettlementRequest {
    /// Request for `target` carrying the limits from `config`.
    #[must_use]
    pub fn new(
        target: SettlementTarget,
        merchant_id: MerchantId,
        currency: impl Into<String>,
        amount: Decimal,
        payment_ids: Vec<PaymentId>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            target,
            merchant_id,
            currency: currency.into(),
            amount,
            payment_ids,
            max_cost: config.max_settlement_cost,
            priority_fee: config.priority_fee,
            max_attempts: config.retry_attempts,
            timeout: config.settlement_timeout,
        }
    }
}

/// Successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Transaction reference on the rail.
    pub tx_ref: String,
    pub cost_units: u64,
    pub cost: Decimal,
}

/// Failed transfer, with the rail's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorFailure {
    pub reason: String,
}

impl ConnectorFailure {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConnectorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_config_defaults() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.max_settlement_cost, 100_000);
        assert_eq!(cfg.priority_fee, 1_000);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.settlement_timeout.as_secs(), 300);
        assert!(!cfg.emergency_pause);
    }

    #[test]
    fn partial_update_never_touches_pause() {
        let mut cfg = SettlementConfig {
            emergency_pause: true,
            ..SettlementConfig::default()
        };
        cfg.apply(&SettlementConfigUpdate {
            priority_fee: Some(5),
            settlement_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        assert_eq!(cfg.priority_fee, 5);
        assert_eq!(cfg.settlement_timeout.as_secs(), 60);
        assert_eq!(cfg.retry_attempts, 3);
        assert!(cfg.emergency_pause);
    }

    #[test]
    fn timeout_bounds() {
        let mut cfg = SettlementConfig::default();
        cfg.validate().unwrap();

        cfg.settlement_timeout = Duration::ZERO;
        assert!(matches!(cfg.validate(), Err(EscrowError::Configuration(_))));

        cfg.settlement_timeout = Duration::from_secs(constants::MAX_SETTLEMENT_TIMEOUT_SECS);
        cfg.validate().unwrap();

        cfg.settlement_timeout = Duration::from_secs(1_000_000_000_000_000);
        assert!(matches!(cfg.validate(), Err(EscrowError::Configuration(_))));
    }

    #[test]
    fn request_carries_config_limits() {
        let cfg = SettlementConfig::default();
        let req = SettlementRequest::new(
            SettlementTarget::Batch(BatchId::new()),
            MerchantId::from("m"),
            "USDC",
            Decimal::new(120, 0),
            vec![PaymentId::new()],
            &cfg,
        );
        assert_eq!(req.max_cost, cfg.max_settlement_cost);
        assert_eq!(req.max_attempts, 3);
        assert_eq!(req.timeout, cfg.settlement_timeout);
    }

    #[test]
    fn target_display() {
        let pid = PaymentId::new();
        assert!(SettlementTarget::Direct(pid).to_string().starts_with("direct:pay:"));
        assert!(
            SettlementTarget::Batch(BatchId::new())
                .to_string()
                .starts_with("batch:")
        );
    }
}
