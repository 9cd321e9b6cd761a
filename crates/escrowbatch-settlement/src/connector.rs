//! Settlement connector: the seam to the external payment rail.
//!
//! The rail protocol is out of scope. A connector takes one
//! [`SettlementRequest`] and answers with a receipt or a failure reason;
//! retries within `max_attempts` are the connector's business.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use escrowbatch_types::{ConnectorFailure, SettlementReceipt, SettlementRequest};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Executes transfers on the payment rail.
pub trait SettlementConnector {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "connector"
    }

    /// Perform one transfer.
    ///
    /// # Errors
    /// Returns a [`ConnectorFailure`] with the rail's reason.
    fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt, ConnectorFailure>;
}

impl<C: SettlementConnector + ?Sized> SettlementConnector for &C {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt, ConnectorFailure> {
        (**self).settle(request)
    }
}

/// Scripted outcome for [`ScriptedConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeed { cost_units: u64 },
    Fail(String),
}

/// Deterministic connector for tests and dry runs.
///
/// Plays queued outcomes in order, then succeeds. Transaction references
/// are derived from the request target, so reruns produce the same refs.
/// Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<SettlementRequest>>,
}

/// Cost per unit reported by [`ScriptedConnector`], in settlement currency.
const SCRIPTED_UNIT_COST: Decimal = Decimal::from_parts(25, 0, 0, false, 6);
const SCRIPTED_DEFAULT_UNITS: u64 = 5_000;

impl ScriptedConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose next calls follow `outcomes`.
    #[must_use]
    pub fn with_script(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    /// Queue a failure for the next unscripted call.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Outcome::Fail(reason.into()));
    }

    /// Queue a success for the next unscripted call.
    pub fn push_success(&self, cost_units: u64) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Outcome::Succeed { cost_units });
    }

    /// Requests seen so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<SettlementRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn tx_ref(request: &SettlementRequest) -> String {
        let digest = Sha256::digest(request.target.to_string().as_bytes());
        format!("tx_{}", hex::encode(&digest[..16]))
    }
}

impl SettlementConnector for ScriptedConnector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt, ConnectorFailure> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Outcome::Succeed {
                cost_units: SCRIPTED_DEFAULT_UNITS,
            });

        match next {
            Outcome::Fail(reason) => Err(ConnectorFailure::new(reason)),
            Outcome::Succeed { cost_units } if cost_units > request.max_cost => {
                Err(ConnectorFailure::new(format!(
                    "cost {cost_units} exceeds cap {}",
                    request.max_cost
                )))
            }
            Outcome::Succeed { cost_units } => Ok(SettlementReceipt {
                tx_ref: Self::tx_ref(request),
                cost_units,
                cost: Decimal::from(cost_units) * SCRIPTED_UNIT_COST,
            }),
        }
    }
}
