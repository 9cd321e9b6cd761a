//! # escrowbatch-types
//!
//! Shared types, errors, and configuration for the **EscrowBatch** engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`MerchantId`], [`PaymentId`], [`BatchId`]
//! - **Tiers**: [`Tier`], [`TierClassifier`]
//! - **Merchant model**: [`MerchantConfig`], [`MerchantConfigUpdate`], [`BatchFrequency`]
//! - **Payment model**: [`PendingPayment`], [`PaymentStatus`]
//! - **Batch model**: [`Batch`], [`BatchStatus`]
//! - **Escrow model**: [`EscrowAccount`], [`Release`]
//! - **Settlement contract**: [`SettlementConfig`], [`SettlementRequest`],
//!   [`SettlementReceipt`], [`ConnectorFailure`]
//! - **Reporting**: [`BatchingMetrics`]
//! - **Configuration**: [`EngineConfig`], [`MerchantDefaults`]
//! - **Errors**: [`EscrowError`] with `EB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod merchant;
pub mod metrics;
pub mod payment;
pub mod settlement;
pub mod tier;

// Re-export all primary types at crate root for ergonomic imports:
//   use escrowbatch_types::{Batch, PendingPayment, EscrowAccount, ...};

pub use batch::*;
pub use config::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use merchant::*;
pub use metrics::*;
pub use payment::*;
pub use settlement::*;
pub use tier::*;

// Constants are accessed via `escrowbatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
