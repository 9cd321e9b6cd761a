//! Configuration types for an EscrowBatch engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchFrequency, EscrowError, Result, SettlementConfig, TierClassifier, constants};

/// Top-level engine configuration.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// # use escrowbatch_types::EngineConfig;
/// let cfg = EngineConfig::from_json(r#"{"min_payments_per_batch": 5}"#).unwrap();
/// assert_eq!(cfg.min_payments_per_batch, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial settlement config, written only if the store has none.
    pub settlement: SettlementConfig,
    /// Defaults applied to merchants seen for the first time.
    pub merchant_defaults: MerchantDefaults,
    /// Credential prefixes per tier.
    pub tiers: TierClassifier,
    /// Pending count that triggers a batch below the max amount.
    pub min_payments_per_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement: SettlementConfig::default(),
            merchant_defaults: MerchantDefaults::default(),
            tiers: TierClassifier::default(),
            min_payments_per_batch: constants::MIN_PAYMENTS_PER_BATCH,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    /// Returns `Configuration` if the document is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| EscrowError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `Configuration` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.min_payments_per_batch == 0 {
            return Err(EscrowError::Configuration(
                "min_payments_per_batch must be > 0".to_string(),
            ));
        }
        if self.tiers.enterprise_prefix.is_empty() || self.tiers.business_prefix.is_empty() {
            return Err(EscrowError::Configuration(
                "tier prefixes must not be empty".to_string(),
            ));
        }
        self.settlement.validate()?;
        self.merchant_defaults.validate()
    }
}

/// Batching defaults for new merchants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantDefaults {
    pub frequency: BatchFrequency,
    pub batch_time: String,
    pub min_batch_amount: Decimal,
    pub max_batch_amount: Decimal,
    pub auto_settle: bool,
    pub currency: String,
}

impl Default for MerchantDefaults {
    fn default() -> Self {
        Self {
            frequency: BatchFrequency::Daily,
            batch_time: constants::DEFAULT_BATCH_TIME.to_string(),
            min_batch_amount: Decimal::new(constants::DEFAULT_MIN_BATCH_AMOUNT, 0),
            max_batch_amount: Decimal::new(constants::DEFAULT_MAX_BATCH_AMOUNT, 0),
            auto_settle: true,
            currency: constants::DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl MerchantDefaults {
    /// # Errors
    /// Returns `Configuration` if the thresholds are inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_amount <= Decimal::ZERO || self.min_batch_amount > self.max_batch_amount
        {
            return Err(EscrowError::Configuration(format!(
                "merchant defaults need 0 < min_batch_amount <= max_batch_amount, got {} / {}",
                self.min_batch_amount, self.max_batch_amount
            )));
        }
        if self.currency.is_empty() {
            return Err(EscrowError::Configuration(
                "default currency must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
