//! Balance scanner - reads native and token balances for an account.
//!
//! Two-tier read: the optional balance index first, the ledger second.
//! Each call re-reads current state; nothing is cached between scans.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{ChainError, ChainResult, SweepError, SweepResult};
use crate::metrics::record_scan_fallback;
use crate::models::{
    Address, BalanceSnapshot, BalanceSource, NativeBalance, TokenBalance, TokenScan,
};
use crate::ports::{BalanceIndex, IndexedBalance, LedgerReader};

/// Reads the source account's balances.
pub struct BalanceScanner<L: LedgerReader> {
    ledger: Arc<L>,
    index: Option<Arc<dyn BalanceIndex>>,
    rent_exempt_reserve: u64,
}

impl<L: LedgerReader> BalanceScanner<L> {
    pub fn new(
        ledger: Arc<L>,
        index: Option<Arc<dyn BalanceIndex>>,
        rent_exempt_reserve: u64,
    ) -> Self {
        Self {
            ledger,
            index,
            rent_exempt_reserve,
        }
    }

    /// Scan `account`.
    ///
    /// Fails with [`SweepError::BalancesUnavailable`] only when every
    /// configured source failed; never fabricates a zero balance.
    #[instrument(skip(self), fields(account = %account.short()))]
    pub async fn scan(&self, account: &Address) -> SweepResult<BalanceSnapshot> {
        let mut index_error = None;

        if let Some(index) = &self.index {
            match self.scan_index(index.as_ref(), account).await {
                Ok(snapshot) => {
                    debug!(tokens = snapshot.tokens.len(), "Balances read from index");
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(error = %e, "⚠️  Balance index failed, falling back to ledger");
                    record_scan_fallback();
                    index_error = Some(e);
                }
            }
        }

        match self.scan_ledger(account).await {
            Ok(snapshot) => {
                debug!(tokens = snapshot.tokens.len(), "Balances read from ledger");
                Ok(snapshot)
            }
            Err(ledger) => {
                warn!(error = %ledger, "❌ Balances unavailable");
                Err(SweepError::BalancesUnavailable {
                    account: *account,
                    index: index_error,
                    ledger,
                })
            }
        }
    }

    async fn scan_index(
        &self,
        index: &dyn BalanceIndex,
        account: &Address,
    ) -> ChainResult<BalanceSnapshot> {
        let entries = index.indexed_balances(account).await?;

        let native = entries
            .iter()
            .find(|entry| entry.is_native())
            .ok_or_else(|| ChainError::InvalidResponse {
                method: "indexed_balances".into(),
                message: "native balance missing".into(),
            })?;
        let native_units =
            u64::try_from(native.raw_amount).map_err(|_| ChainError::InvalidResponse {
                method: "indexed_balances".into(),
                message: format!("native balance {} out of range", native.raw_amount),
            })?;

        let mut tokens = Vec::new();
        for entry in entries.iter().filter(|entry| entry.raw_amount > 0) {
            if let Some(mint) = entry.mint {
                tokens.push(self.token_from_index(account, mint, entry).await?);
            }
        }

        Ok(BalanceSnapshot {
            account: *account,
            native: NativeBalance::new(native_units, self.rent_exempt_reserve),
            tokens: TokenScan::new(tokens),
            source: BalanceSource::Index,
            scanned_at: chrono::Utc::now(),
        })
    }

    /// The index reports mints only; the holding is taken to be the derived
    /// sub-account. When that account holds less than the index reports,
    /// part of the balance lives elsewhere and only the ledger listing can
    /// find it.
    async fn token_from_index(
        &self,
        owner: &Address,
        mint: Address,
        entry: &IndexedBalance,
    ) -> ChainResult<TokenBalance> {
        let account = self.ledger.sub_account_address(owner, &mint);
        match self.ledger.token_account_balance(&account).await? {
            Some(amount) if amount >= entry.raw_amount => Ok(TokenBalance {
                mint,
                account,
                raw_amount: amount,
                decimals: entry.decimals,
            }),
            held => Err(ChainError::InvalidResponse {
                method: "indexed_balances".into(),
                message: format!(
                    "mint {} reported with {} units, sub-account holds {}",
                    mint.short(),
                    entry.raw_amount,
                    held.unwrap_or(0)
                ),
            }),
        }
    }

    async fn scan_ledger(&self, account: &Address) -> ChainResult<BalanceSnapshot> {
        let native_units = self.ledger.native_balance(account).await?;
        let holdings = self.ledger.token_accounts(account).await?;

        let tokens = holdings
            .into_iter()
            .map(|holding| TokenBalance {
                mint: holding.mint,
                account: holding.account,
                raw_amount: holding.raw_amount,
                decimals: holding.decimals,
            })
            .collect();

        Ok(BalanceSnapshot {
            account: *account,
            native: NativeBalance::new(native_units, self.rent_exempt_reserve),
            tokens: TokenScan::new(tokens),
            source: BalanceSource::Ledger,
            scanned_at: chrono::Utc::now(),
        })
    }
}
