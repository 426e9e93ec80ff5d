//! Solana adapter for the sweep orchestrator.
//!
//! This crate implements the `sweeper-core` ports against a Solana cluster:
//!
//! - [`SolanaRpcClient`] - [`LedgerReader`] and [`TransactionSubmitter`] over
//!   HTTP JSON-RPC
//! - [`KeypairSigner`] - [`TransactionSigner`] backed by a local keypair
//! - [`HttpBalanceIndex`] - [`BalanceIndex`] backed by a wallet token-list API
//!
//! Sub-accounts are associated token accounts; token transfers use SPL
//! `TransferChecked` and missing destinations are created with the
//! Associated Token Account program.
//!
//! # Usage
//!
//! ```ignore
//! use sweeper_solana::{KeypairSigner, SolanaRpcClient, SolanaRpcConfig};
//!
//! let rpc = Arc::new(SolanaRpcClient::new(SolanaRpcConfig {
//!     url: "https://api.devnet.solana.com".to_string(),
//!     ..Default::default()
//! })?);
//! let signer = Arc::new(KeypairSigner::new(read_keypair_file("id.json")?));
//! let service = SweepService::new(config, rpc.clone(), rpc, signer, None)?;
//! ```
//!
//! [`LedgerReader`]: sweeper_core::ports::LedgerReader
//! [`TransactionSubmitter`]: sweeper_core::ports::TransactionSubmitter
//! [`TransactionSigner`]: sweeper_core::ports::TransactionSigner
//! [`BalanceIndex`]: sweeper_core::ports::BalanceIndex

mod index;
pub mod instructions;
mod rpc;
mod signer;

pub use index::HttpBalanceIndex;
pub use rpc::{SolanaRpcClient, SolanaRpcConfig};
pub use signer::KeypairSigner;
