//! Port trait for the optional fast balance index.

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::Address;

/// One balance entry from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBalance {
    /// Token mint; `None` for the native balance.
    pub mint: Option<Address>,
    /// Balance in the smallest unit.
    pub raw_amount: u128,
    /// Display scaling factor.
    pub decimals: u8,
    /// Decimal-scaled balance as reported by the index.
    pub ui_amount: f64,
}

impl IndexedBalance {
    pub fn is_native(&self) -> bool {
        self.mint.is_none()
    }
}

/// Caching balance service used as the fast scan path.
#[async_trait]
pub trait BalanceIndex: Send + Sync {
    /// Balances of `account`, native entry included, in index order.
    async fn indexed_balances(&self, account: &Address) -> ChainResult<Vec<IndexedBalance>>;
}
