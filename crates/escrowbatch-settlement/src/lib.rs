//! # escrowbatch-settlement
//!
//! **Settlement plane**: connector contract, batch settlement state machine,
//! failure resolution, timeout sweep, and escrow conservation checks.
//!
//! ## Architecture
//!
//! The settlement plane receives a PENDING [`Batch`](escrowbatch_types::Batch)
//! from the aggregator and:
//! 1. Guards against double settlement (only PENDING batches proceed)
//! 2. Commits PROCESSING before calling the connector
//! 3. Records the connector outcome on the batch, its members, and the
//!    merchant's escrow account in one write
//! 4. Lets operators abandon FAILED batches and expire stuck ones
//! 5. Checks that every escrow account equals the batches it holds
//!
//! ## Batch lifecycle
//!
//! ```text
//! PENDING → PROCESSING → SETTLED
//!                      ↘ FAILED → (abandoned)
//! ```

pub mod connector;
pub mod conservation;
pub mod executor;
pub mod timeout;

pub use connector::{Outcome, ScriptedConnector, SettlementConnector};
pub use conservation::{ExpectedEscrow, verify_batch_integrity, verify_escrow_balance};
pub use executor::SettlementExecutor;
pub use timeout::{TIMEOUT_REASON, expire_stuck_settlements};
