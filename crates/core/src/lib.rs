//! Core domain layer for the sweep orchestrator.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services that move every asset held by one account to
//! another in a sequence of batched transactions. It follows hexagonal
//! architecture principles - this is the innermost layer with no
//! dependencies on any particular ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     sweeper (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     sweeper-solana                          │
//! │          (JSON-RPC ledger, keypair signer, index)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     sweeper-core  ← YOU ARE HERE            │
//! │               (models, ports, services)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Address, TokenBalance, Batch, TransferPlan, etc.)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (SweepService and its stages)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! - [`ports::LedgerReader`] - Balances, sub-account derivation and anchors
//! - [`ports::TransactionSigner`] - Signs with the fee payer's key
//! - [`ports::TransactionSubmitter`] - Sends and confirms signed transactions
//! - [`ports::BalanceIndex`] - Optional fast balance lookup
//!
//! ## Sweep Lifecycle
//!
//! 1. Scan balances (index first, ledger fallback)
//! 2. Plan batches of at most `max_batch_size` tokens; the last token batch
//!    carries 70% of the usable native balance, a trailing batch the rest
//! 3. Build each batch against current state, creating missing destination
//!    sub-accounts before their transfers
//! 4. Submit strictly in order, one fresh anchor per batch
//! 5. Re-scan after a settle delay and publish the refreshed balances

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;
