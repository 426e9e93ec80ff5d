//! Post-run balance refresh.
//!
//! After a run the ledger needs a moment to propagate; the refresher waits
//! `settle_delay`, re-scans, and publishes the result to subscribers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::models::{Address, BalanceSource, NativeBalance, TokenBalance};
use crate::ports::LedgerReader;

use super::scanner::BalanceScanner;

/// Balances observed by a refresh scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedBalances {
    pub account: Address,
    pub native: NativeBalance,
    pub tokens: Vec<TokenBalance>,
    pub source: BalanceSource,
    pub scanned_at: DateTime<Utc>,
}

/// Schedules re-scans and publishes them on a watch channel.
pub struct BalanceRefresher<L: LedgerReader> {
    scanner: Arc<BalanceScanner<L>>,
    settle_delay: Duration,
    tx: watch::Sender<Option<RefreshedBalances>>,
}

impl<L: LedgerReader + 'static> BalanceRefresher<L> {
    pub fn new(scanner: Arc<BalanceScanner<L>>, settle_delay: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            scanner,
            settle_delay,
            tx,
        }
    }

    /// Observe refreshed balances. The initial value is `None`.
    pub fn subscribe(&self) -> watch::Receiver<Option<RefreshedBalances>> {
        self.tx.subscribe()
    }

    /// Spawn the delayed re-scan of `account`.
    ///
    /// A failed re-scan is logged and publishes nothing.
    pub fn schedule(&self, account: Address) -> JoinHandle<()> {
        let scanner = self.scanner.clone();
        let tx = self.tx.clone();
        let delay = self.settle_delay;

        tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                match scanner.scan(&account).await {
                    Ok(snapshot) => {
                        let refreshed = RefreshedBalances {
                            account: snapshot.account,
                            native: snapshot.native,
                            source: snapshot.source,
                            scanned_at: snapshot.scanned_at,
                            tokens: snapshot.tokens.collect(),
                        };
                        debug!(
                            native = refreshed.native.amount_units,
                            tokens = refreshed.tokens.len(),
                            "🔄 Balances refreshed"
                        );
                        tx.send_replace(Some(refreshed));
                    }
                    Err(e) => warn!(error = %e, "⚠️  Balance refresh failed"),
                }
            }
            .instrument(info_span!("refresh", account = %account.short())),
        )
    }
}
