//! Per-merchant batching configuration.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EscrowError, MerchantDefaults, MerchantId, Result, Tier};

/// Advisory settlement cadence. Stored but not evaluated by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for BatchFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Batching configuration for one merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub merchant_id: MerchantId,
    pub tier: Tier,
    pub batching_enabled: bool,
    pub frequency: BatchFrequency,
    /// Day of week/month for the batch run. Advisory.
    pub batch_day: Option<u8>,
    /// UTC time of day (`HH:MM`) for the batch run. Advisory.
    pub batch_time: String,
    /// Pending total below which no batch is created.
    pub min_batch_amount: Decimal,
    /// Pending total at or above which a batch is created immediately.
    pub max_batch_amount: Decimal,
    /// Settle new batches as soon as they are created.
    pub auto_settle: bool,
    /// Currency the merchant settles in.
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantConfig {
    /// Default config for a merchant first seen on `tier`.
    ///
    /// Batching is enabled exactly when the tier uses escrow.
    #[must_use]
    pub fn for_tier(
        merchant_id: MerchantId,
        tier: Tier,
        defaults: &MerchantDefaults,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            merchant_id,
            tier,
            batching_enabled: tier.uses_escrow(),
            frequency: defaults.frequency,
            batch_day: None,
            batch_time: defaults.batch_time.clone(),
            min_batch_amount: defaults.min_batch_amount,
            max_batch_amount: defaults.max_batch_amount,
            auto_settle: defaults.auto_settle,
            currency: defaults.currency.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update. Leaves `self` untouched if the result would
    /// be invalid.
    ///
    /// # Errors
    /// Returns `InvalidMerchantConfig` if the thresholds are non-positive or
    /// `min_batch_amount > max_batch_amount`.
    pub fn apply(&mut self, update: &MerchantConfigUpdate, now: DateTime<Utc>) -> Result<()> {
        let mut next = self.clone();
        if let Some(enabled) = update.batching_enabled {
            next.batching_enabled = enabled;
        }
        if let Some(frequency) = update.frequency {
            next.frequency = frequency;
        }
        if let Some(day) = update.batch_day {
            next.batch_day = day;
        }
        if let Some(time) = &update.batch_time {
            next.batch_time.clone_from(time);
        }
        if let Some(min) = update.min_batch_amount {
            next.min_batch_amount = min;
        }
        if let Some(max) = update.max_batch_amount {
            next.max_batch_amount = max;
        }
        if let Some(auto) = update.auto_settle {
            next.auto_settle = auto;
        }
        next.validate()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Check threshold sanity.
    ///
    /// # Errors
    /// Returns `InvalidMerchantConfig` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidMerchantConfig {
                reason: format!("min_batch_amount must be > 0, got {}", self.min_batch_amount),
            });
        }
        if self.min_batch_amount > self.max_batch_amount {
            return Err(EscrowError::InvalidMerchantConfig {
                reason: format!(
                    "min_batch_amount {} exceeds max_batch_amount {}",
                    self.min_batch_amount, self.max_batch_amount
                ),
            });
        }
        if let Some(day) = self.batch_day {
            if day == 0 || day > 31 {
                return Err(EscrowError::InvalidMerchantConfig {
                    reason: format!("batch_day must be in 1..=31, got {day}"),
                });
            }
        }
        Ok(())
    }
}

/// Partial update of a [`MerchantConfig`]. `None` keeps the current value.
///
/// The identity fields (merchant, tier, currency) are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantConfigUpdate {
    pub batching_enabled: Option<bool>,
    pub frequency: Option<BatchFrequency>,
    /// `Some(None)` clears the day.
    pub batch_day: Option<Option<u8>>,
    pub batch_time: Option<String>,
    pub min_batch_amount: Option<Decimal>,
    pub max_batch_amount: Option<Decimal>,
    pub auto_settle: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tier: Tier) -> MerchantConfig {
        MerchantConfig::for_tier(
            MerchantId::from("m-1"),
            tier,
            &MerchantDefaults::default(),
            Utc::now(),
        )
    }

    #[test]
    fn defaults_follow_tier() {
        assert!(!config(Tier::Free).batching_enabled);
        assert!(config(Tier::Business).batching_enabled);
        let cfg = config(Tier::Enterprise);
        assert!(cfg.batching_enabled);
        assert!(cfg.auto_settle);
        assert_eq!(cfg.frequency, BatchFrequency::Daily);
        assert_eq!(cfg.min_batch_amount, Decimal::new(100, 0));
        assert_eq!(cfg.max_batch_amount, Decimal::new(10_000, 0));
        assert_eq!(cfg.currency, "USDC");
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut cfg = config(Tier::Business);
        let update = MerchantConfigUpdate {
            min_batch_amount: Some(Decimal::new(250, 0)),
            auto_settle: Some(false),
            ..Default::default()
        };
        cfg.apply(&update, Utc::now()).unwrap();
        assert_eq!(cfg.min_batch_amount, Decimal::new(250, 0));
        assert!(!cfg.auto_settle);
        assert!(cfg.batching_enabled);
        assert_eq!(cfg.max_batch_amount, Decimal::new(10_000, 0));
    }

    #[test]
    fn invalid_update_leaves_config_untouched() {
        let mut cfg = config(Tier::Business);
        let before = cfg.clone();
        let update = MerchantConfigUpdate {
            min_batch_amount: Some(Decimal::new(20_000, 0)),
            ..Default::default()
        };
        let err = cfg.apply(&update, Utc::now()).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidMerchantConfig { .. }));
        assert_eq!(cfg, before);
    }

    #[test]
    fn zero_min_rejected() {
        let mut cfg = config(Tier::Business);
        let update = MerchantConfigUpdate {
            min_batch_amount: Some(Decimal::ZERO),
            ..Default::default()
        };
        assert!(cfg.apply(&update, Utc::now()).is_err());
    }

    #[test]
    fn batch_day_can_be_cleared() {
        let mut cfg = config(Tier::Business);
        let set = MerchantConfigUpdate {
            batch_day: Some(Some(15)),
            ..Default::default()
        };
        cfg.apply(&set, Utc::now()).unwrap();
        assert_eq!(cfg.batch_day, Some(15));

        let clear = MerchantConfigUpdate {
            batch_day: Some(None),
            ..Default::default()
        };
        cfg.apply(&clear, Utc::now()).unwrap();
        assert_eq!(cfg.batch_day, None);
    }

    #[test]
    fn update_deserializes_from_sparse_json() {
        let update: MerchantConfigUpdate =
            serde_json::from_str(r#"{"frequency":"weekly","max_batch_amount":"5000"}"#).unwrap();
        assert_eq!(update.frequency, Some(BatchFrequency::Weekly));
        assert_eq!(update.max_batch_amount, Some(Decimal::new(5000, 0)));
        assert_eq!(update.auto_settle, None);
    }
}
