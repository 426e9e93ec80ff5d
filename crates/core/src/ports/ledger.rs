//! Port trait for reading ledger state.
//!
//! This trait defines every read the sweep pipeline performs against the
//! remote ledger. Implementations live in the infrastructure layer
//! (e.g., `sweeper-solana`).

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::{Address, Anchor, FinalityTier};

/// Raw token holding as listed by the ledger, before zero-filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolding {
    /// Holding account address.
    pub account: Address,
    /// Asset identifier.
    pub mint: Address,
    /// Balance in the smallest unit.
    pub raw_amount: u128,
    /// Display scaling factor.
    pub decimals: u8,
}

/// Port trait for ledger reads.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Native balance of `account` in the smallest unit.
    async fn native_balance(&self, account: &Address) -> ChainResult<u64>;

    /// All token holdings owned by `account`, including empty ones.
    async fn token_accounts(&self, account: &Address) -> ChainResult<Vec<TokenHolding>>;

    /// Deterministic sub-account address for `(owner, mint)`.
    ///
    /// Pure function: no network access.
    fn sub_account_address(&self, owner: &Address, mint: &Address) -> Address;

    /// Whether an account exists at `address`.
    async fn account_exists(&self, address: &Address) -> ChainResult<bool>;

    /// Current raw balance of a token holding account.
    ///
    /// Returns `None` when the account no longer exists.
    async fn token_account_balance(&self, account: &Address) -> ChainResult<Option<u128>>;

    /// Fetch a fresh anchor at the given finality tier.
    async fn latest_anchor(&self, tier: FinalityTier) -> ChainResult<Anchor>;
}
