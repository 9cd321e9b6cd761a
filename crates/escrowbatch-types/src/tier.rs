//! Service tiers and the credential classifier.
//!
//! The tier decides the payment path: Free settles directly, Business and
//! Enterprise are held in escrow and batched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Service level derived from a caller's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Business,
    Enterprise,
}

impl Tier {
    /// Whether payments on this tier are routed through escrow batching.
    #[must_use]
    pub fn uses_escrow(self) -> bool {
        matches!(self, Self::Business | Self::Enterprise)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "FREE"),
            Self::Business => write!(f, "BUSINESS"),
            Self::Enterprise => write!(f, "ENTERPRISE"),
        }
    }
}

/// Prefix-match classifier from an opaque credential to a [`Tier`].
///
/// Anything that matches neither prefix is Free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierClassifier {
    pub enterprise_prefix: String,
    pub business_prefix: String,
}

impl TierClassifier {
    #[must_use]
    pub fn new(enterprise_prefix: impl Into<String>, business_prefix: impl Into<String>) -> Self {
        Self {
            enterprise_prefix: enterprise_prefix.into(),
            business_prefix: business_prefix.into(),
        }
    }

    #[must_use]
    pub fn classify(&self, credential: &str) -> Tier {
        if credential.starts_with(&self.enterprise_prefix) {
            Tier::Enterprise
        } else if credential.starts_with(&self.business_prefix) {
            Tier::Business
        } else {
            Tier::Free
        }
    }
}

impl Default for TierClassifier {
    fn default() -> Self {
        Self::new(
            constants::ENTERPRISE_CREDENTIAL_PREFIX,
            constants::BUSINESS_CREDENTIAL_PREFIX,
        )
    }
}
