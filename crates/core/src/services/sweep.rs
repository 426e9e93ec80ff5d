//! Core sweep service - orchestrates scan, plan, build and submission.
//!
//! One run moves every non-zero token balance of a source account to a
//! destination account, then sweeps the usable native balance in the
//! configured tranches. Batches execute strictly in order; a failed batch is
//! recorded and the run moves on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{SweepError, SweepResult};
use crate::metrics::{
    BatchTimer, record_batch, record_batch_failure, record_run_started, record_transferred,
};
use crate::models::{
    Address, Batch, BatchOutcome, BatchStatus, NativeSweepOutcome, RunResult, TransferPlan,
};
use crate::ports::{BalanceIndex, LedgerReader, TransactionSigner, TransactionSubmitter};

use super::builder::TransactionBuilder;
use super::config::SweepConfig;
use super::planner::{BatchPlanner, ScanOrder, TokenPriority};
use super::refresh::{BalanceRefresher, RefreshedBalances};
use super::scanner::BalanceScanner;
use super::sequencer::{SequencerConfig, SubmissionSequencer};

// =============================================================================
// Request
// =============================================================================

/// What to sweep and where to.
#[derive(Clone)]
pub struct SweepRequest {
    /// Account being emptied; must be the signer's fee payer.
    pub source: Address,
    /// Receiving account.
    pub destination: Address,
    /// Token ordering; defaults to scan order.
    pub priority: Arc<dyn TokenPriority>,
}

impl SweepRequest {
    pub fn new(source: Address, destination: Address) -> Self {
        Self {
            source,
            destination,
            priority: Arc::new(ScanOrder),
        }
    }

    pub fn with_priority(mut self, priority: Arc<dyn TokenPriority>) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// Run Guard
// =============================================================================

/// Marks a source account as busy until dropped.
struct RunGuard {
    active: Arc<Mutex<HashSet<Address>>>,
    account: Address,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.account);
        }
    }
}

// =============================================================================
// SweepService
// =============================================================================

/// Main sweep orchestrator.
///
/// # Flow
///
/// 1. Reject the run if one is already active for the source account
/// 2. Scan balances (index first, ledger fallback)
/// 3. Plan batches, capturing the usable native balance once
/// 4. For each batch: build against current state, then submit and confirm
/// 5. Aggregate the [`RunResult`] and schedule a balance refresh
pub struct SweepService<L: LedgerReader, T: TransactionSubmitter> {
    config: SweepConfig,
    scanner: Arc<BalanceScanner<L>>,
    planner: BatchPlanner,
    builder: TransactionBuilder<L>,
    sequencer: SubmissionSequencer<L, T>,
    refresher: BalanceRefresher<L>,
    fee_payer: Address,
    active: Arc<Mutex<HashSet<Address>>>,
}

impl<L: LedgerReader + 'static, T: TransactionSubmitter> SweepService<L, T> {
    pub fn new(
        config: SweepConfig,
        ledger: Arc<L>,
        submitter: Arc<T>,
        signer: Arc<dyn TransactionSigner>,
        index: Option<Arc<dyn BalanceIndex>>,
    ) -> SweepResult<Self> {
        config.validate()?;

        let scanner = Arc::new(BalanceScanner::new(
            ledger.clone(),
            index,
            config.rent_exempt_reserve,
        ));
        let sequencer_config = SequencerConfig {
            finality: config.finality,
            max_send_retries: config.max_send_retries,
            skip_preflight: config.skip_preflight,
        };
        let fee_payer = signer.fee_payer();

        Ok(Self {
            planner: BatchPlanner::new(config.max_batch_size, config.sweep_split),
            builder: TransactionBuilder::new(ledger.clone()),
            sequencer: SubmissionSequencer::new(sequencer_config, ledger, submitter, signer),
            refresher: BalanceRefresher::new(scanner.clone(), config.settle_delay),
            scanner,
            fee_payer,
            active: Arc::new(Mutex::new(HashSet::new())),
            config,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Observe post-run balance refreshes.
    pub fn subscribe_balances(&self) -> watch::Receiver<Option<RefreshedBalances>> {
        self.refresher.subscribe()
    }

    /// Run a sweep to completion.
    pub async fn run(&self, request: &SweepRequest) -> SweepResult<RunResult> {
        // sender kept alive for the whole run so the flag never reads as closed
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_until(request, cancel_rx).await
    }

    /// Run a sweep, stopping at the next batch boundary once `cancel_rx`
    /// reads `true`. A batch in flight is always carried to a terminal state.
    #[instrument(skip_all, fields(source = %request.source.short(), destination = %request.destination.short()))]
    pub async fn run_until(
        &self,
        request: &SweepRequest,
        cancel_rx: watch::Receiver<bool>,
    ) -> SweepResult<RunResult> {
        self.check_request(request)?;
        let _guard = self.begin(&request.source)?;
        record_run_started();
        let started_at = chrono::Utc::now();
        info!("🧹 Starting sweep");

        let batches = self.scan_and_plan(request).await?;
        info!(batches = batches.len(), "📋 Sweep planned");

        let mut outcomes = Vec::with_capacity(batches.len());
        let mut cancelled = false;

        for batch in &batches {
            if *cancel_rx.borrow() {
                warn!(
                    next_batch = batch.index,
                    remaining = batches.len() - batch.index,
                    "🛑 Sweep cancelled at batch boundary"
                );
                cancelled = true;
                break;
            }
            outcomes.push(self.process_batch(batch, request).await);
        }

        let result = aggregate(request, &batches, outcomes, cancelled, started_at);
        info!(
            confirmed = result.confirmed,
            attempted = result.attempted,
            skipped = result.skipped,
            native = ?result.native_sweep,
            "✅ Sweep finished"
        );

        self.refresher.schedule(request.source);
        Ok(result)
    }

    /// Build every plan without submitting anything.
    ///
    /// Plans are built against current state, so later batches do not
    /// account for earlier ones having landed.
    #[instrument(skip_all, fields(source = %request.source.short()))]
    pub async fn preview(&self, request: &SweepRequest) -> SweepResult<Vec<TransferPlan>> {
        self.check_request(request)?;
        let batches = self.scan_and_plan(request).await?;

        let mut plans = Vec::new();
        for batch in &batches {
            match self
                .builder
                .build(batch, &request.source, &request.destination)
                .await
            {
                Ok(Some(plan)) => plans.push(plan),
                Ok(None) => debug!(batch = batch.index, "Nothing to submit"),
                Err(e) => warn!(batch = batch.index, error = %e, "⚠️  Preview build failed"),
            }
        }
        Ok(plans)
    }

    fn check_request(&self, request: &SweepRequest) -> SweepResult<()> {
        if request.source != self.fee_payer {
            return Err(SweepError::Config(format!(
                "source {} is not the signer's account {}",
                request.source, self.fee_payer
            )));
        }
        if request.source == request.destination {
            return Err(SweepError::Config(
                "source and destination must differ".into(),
            ));
        }
        Ok(())
    }

    fn begin(&self, account: &Address) -> SweepResult<RunGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| SweepError::Internal("run registry poisoned".into()))?;
        if !active.insert(*account) {
            warn!(account = %account.short(), "⚠️  Sweep already in progress");
            return Err(SweepError::RunInProgress(*account));
        }
        Ok(RunGuard {
            active: self.active.clone(),
            account: *account,
        })
    }

    async fn scan_and_plan(&self, request: &SweepRequest) -> SweepResult<Vec<Batch>> {
        let snapshot = self.scanner.scan(&request.source).await?;
        debug!(
            native = snapshot.native.amount_units,
            usable = snapshot.native.usable(),
            tokens = snapshot.tokens.len(),
            source = ?snapshot.source,
            "Balances scanned"
        );
        Ok(self
            .planner
            .plan(snapshot.tokens, &snapshot.native, request.priority.as_ref()))
    }

    /// Build and submit one batch; never fails the run.
    ///
    /// The outcome carries the batch's planned native tranche whether or not
    /// it was submitted.
    async fn process_batch(&self, batch: &Batch, request: &SweepRequest) -> BatchOutcome {
        let native_units = batch.native_sweep.map_or(0, |sweep| sweep.amount());

        let plan = match self
            .builder
            .build(batch, &request.source, &request.destination)
            .await
        {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                debug!(batch = batch.index, "Nothing to submit, skipping");
                record_batch("skipped");
                return BatchOutcome {
                    index: batch.index,
                    token_transfers: 0,
                    native_units,
                    status: BatchStatus::Skipped,
                };
            }
            Err(e) => {
                error!(batch = batch.index, error = %e, "❌ Batch failed");
                record_batch("failed");
                record_batch_failure(e.kind());
                return BatchOutcome {
                    index: batch.index,
                    token_transfers: 0,
                    native_units,
                    status: BatchStatus::Failed {
                        stage: e.stage(),
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    },
                };
            }
        };

        let _timer = BatchTimer::new();
        let token_transfers = plan.token_transfer_count();

        let status = match self.sequencer.execute(&plan).await {
            Ok(transaction) => {
                info!(
                    batch = batch.index,
                    tokens = token_transfers,
                    created = plan.creation_count(),
                    native = plan.native_amount(),
                    %transaction,
                    "⛓️  Batch confirmed"
                );
                record_batch("confirmed");
                record_transferred(token_transfers, plan.native_amount());
                BatchStatus::Confirmed { transaction }
            }
            Err(e) => {
                error!(batch = batch.index, error = %e, "❌ Batch failed");
                record_batch("failed");
                record_batch_failure(e.kind());
                BatchStatus::Failed {
                    stage: e.stage(),
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                }
            }
        };

        BatchOutcome {
            index: batch.index,
            token_transfers,
            native_units,
            status,
        }
    }
}

/// Fold per-batch outcomes into the run result.
///
/// The native outcome is judged against every planned tranche: one that
/// failed, or never ran because the run was cancelled, counts as not sent.
fn aggregate(
    request: &SweepRequest,
    planned: &[Batch],
    batches: Vec<BatchOutcome>,
    cancelled: bool,
    started_at: chrono::DateTime<chrono::Utc>,
) -> RunResult {
    let confirmed = batches.iter().filter(|b| b.is_confirmed()).count();
    let failed = batches.iter().filter(|b| b.is_failed()).count();
    let skipped = batches
        .iter()
        .filter(|b| matches!(b.status, BatchStatus::Skipped))
        .count();

    let tranches = planned
        .iter()
        .filter(|b| b.native_sweep.is_some_and(|sweep| sweep.amount() > 0))
        .count();
    let sent: Vec<&BatchOutcome> = batches
        .iter()
        .filter(|b| b.native_units > 0 && b.is_confirmed())
        .collect();
    let sent_units = sent.iter().map(|b| b.native_units).sum();
    let native_sweep = if tranches == 0 {
        NativeSweepOutcome::Skipped
    } else if sent.len() == tranches {
        NativeSweepOutcome::Sent { units: sent_units }
    } else {
        NativeSweepOutcome::Failed { units: sent_units }
    };

    RunResult {
        source: request.source,
        destination: request.destination,
        confirmed,
        attempted: confirmed + failed,
        skipped,
        native_sweep,
        cancelled,
        batches,
        started_at,
        finished_at: chrono::Utc::now(),
    }
}
