//! # escrowbatch-ledger
//!
//! **Escrow holding plane**: storage abstraction, pending payment ledger,
//! escrow accounts, and batch aggregation.
//!
//! ## Architecture
//!
//! 1. **EscrowStore**: injected keyed storage with an atomic `commit`
//! 2. **InMemoryStore**: ordered in-memory implementation
//! 3. **EscrowLedger**: appends and lists `Pending` payments, opens escrow accounts
//! 4. **BatchAggregator**: evaluates triggers and seals batches
//!
//! ## Payment Flow
//!
//! ```text
//! SubmitPayment → EscrowLedger.append() → BatchAggregator.maybe_create_batch()
//!     → Batch (Pending) + members Batched + EscrowAccount credited
//! ```
//!
//! Every batch is written together with its members and the account credit,
//! or not at all.

pub mod aggregator;
pub mod ledger;
pub mod memory;
pub mod store;

pub use aggregator::{BatchAggregator, BatchTrigger};
pub use ledger::EscrowLedger;
pub use memory::InMemoryStore;
pub use store::{Changeset, EscrowStore, Write};
