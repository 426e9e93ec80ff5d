//! Submission sequencer - signs, sends and confirms one plan at a time.
//!
//! Per-batch state machine:
//!
//! ```text
//! Built ──► AnchorAcquired ──► Submitted ──► Confirmed
//!   │             │                │
//!   └─────────────┴────────────────┴──────► Failed
//! ```
//!
//! A fresh anchor is fetched for every batch; anchors are never reused.

use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::error::{BatchError, BatchResult};
use crate::models::{BatchState, FinalityTier, Instruction, TransferPlan};
use crate::ports::{
    ConfirmationStatus, LedgerReader, SendOptions, TransactionSigner, TransactionSubmitter,
    UnsignedTransaction,
};

/// Transport settings for the sequencer.
#[derive(Debug, Clone, Copy)]
pub struct SequencerConfig {
    pub finality: FinalityTier,
    pub max_send_retries: u32,
    pub skip_preflight: bool,
}

/// Drives one [`TransferPlan`] through the submission state machine.
pub struct SubmissionSequencer<L: LedgerReader, T: TransactionSubmitter> {
    config: SequencerConfig,
    ledger: Arc<L>,
    submitter: Arc<T>,
    signer: Arc<dyn TransactionSigner>,
}

impl<L: LedgerReader, T: TransactionSubmitter> SubmissionSequencer<L, T> {
    pub fn new(
        config: SequencerConfig,
        ledger: Arc<L>,
        submitter: Arc<T>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            config,
            ledger,
            submitter,
            signer,
        }
    }

    fn send_options(&self) -> SendOptions {
        SendOptions {
            skip_preflight: self.config.skip_preflight,
            max_retries: self.config.max_send_retries,
            preflight_finality: self.config.finality,
        }
    }

    /// Submit `plan` and block until it is confirmed or fails.
    ///
    /// Returns the transaction identifier on confirmation.
    #[instrument(skip_all, fields(batch = plan.batch_index))]
    pub async fn execute(&self, plan: &TransferPlan) -> BatchResult<String> {
        trace!(state = ?BatchState::Built, instructions = plan.instructions.len());

        let anchor = self
            .ledger
            .latest_anchor(self.config.finality)
            .await
            .map_err(BatchError::AnchorUnavailable)?;
        trace!(
            state = ?BatchState::AnchorAcquired,
            anchor = %anchor.hash.short(),
            last_valid_height = anchor.last_valid_height
        );

        let signed = self
            .signer
            .sign(UnsignedTransaction {
                fee_payer: plan.fee_payer,
                instructions: plan.instructions.clone(),
                anchor: anchor.clone(),
            })
            .await?;

        let transaction = self
            .submitter
            .send(&signed, self.send_options())
            .await
            .map_err(|e| BatchError::SubmissionFailed(e.to_string()))?;
        debug!(state = ?BatchState::Submitted, %transaction, "📤 Transaction sent");

        let status = self
            .submitter
            .await_confirmation(&transaction, &anchor, self.config.finality)
            .await
            .map_err(|e| BatchError::ConfirmationFailed {
                transaction: transaction.clone(),
                message: e.to_string(),
            })?;

        match status {
            ConfirmationStatus::Confirmed => {
                trace!(state = ?BatchState::Confirmed, %transaction);
                Ok(transaction)
            }
            ConfirmationStatus::Expired => {
                warn!(%transaction, "⏱️  Anchor expired before finality");
                Err(BatchError::ConfirmationTimeout { transaction })
            }
            ConfirmationStatus::Failed {
                instruction_index,
                reason,
            } => Err(classify_failure(plan, transaction, instruction_index, reason)),
        }
    }
}

/// Map an on-ledger failure to the batch error taxonomy.
fn classify_failure(
    plan: &TransferPlan,
    transaction: String,
    instruction_index: Option<usize>,
    reason: String,
) -> BatchError {
    match instruction_index.and_then(|i| plan.instructions.get(i)) {
        Some(Instruction::CreateSubAccount { mint, .. }) => BatchError::AccountCreationFailed {
            mint: *mint,
            reason,
        },
        _ => BatchError::TransactionFailed {
            transaction,
            reason,
        },
    }
}
