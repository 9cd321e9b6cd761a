//! # escrowbatch-engine
//!
//! **Tier-routed merchant escrow engine.**
//!
//! The engine is the facade over the ledger and settlement planes. It takes
//! a payment, classifies the caller's credential, and either:
//!
//! - **Free**: settles directly through the connector and records the
//!   payment as SETTLED, or
//! - **Business / Enterprise**: appends it to the escrow ledger, runs the
//!   batch trigger, and auto-settles new batches if the merchant asks for it.
//!
//! Storage and the payment rail are injected:
//!
//! ```
//! use escrowbatch_engine::{EscrowBatchEngine, SubmitOutcome};
//! use escrowbatch_ledger::InMemoryStore;
//! use escrowbatch_settlement::ScriptedConnector;
//! use escrowbatch_types::{EngineConfig, MerchantId};
//! use rust_decimal::Decimal;
//!
//! let mut engine = EscrowBatchEngine::new(
//!     InMemoryStore::new(),
//!     ScriptedConnector::new(),
//!     EngineConfig::default(),
//! )
//! .unwrap();
//! let shop = MerchantId::from("shop");
//! let outcome = engine
//!     .submit_payment(&shop, "wallet", Decimal::new(40, 0), "USDC", "sk_business_key")
//!     .unwrap();
//! assert!(matches!(outcome, SubmitOutcome::EscrowBatched { .. }));
//! ```

pub mod engine;
pub mod metrics;

pub use engine::{EscrowBatchEngine, SubmitOutcome, TriggerOutcome};
pub use metrics::MetricsReporter;
