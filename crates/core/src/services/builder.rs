//! Transaction builder - turns one batch into an ordered instruction list.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::error::{BatchError, BatchResult};
use crate::models::{Address, Batch, Instruction, TransferPlan};
use crate::ports::LedgerReader;

/// Builds [`TransferPlan`]s against current ledger state.
///
/// The only network access is the per-token balance re-read and the
/// destination existence probe.
pub struct TransactionBuilder<L: LedgerReader> {
    ledger: Arc<L>,
}

impl<L: LedgerReader> TransactionBuilder<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Build the plan for `batch`.
    ///
    /// Returns `Ok(None)` when there is nothing to submit.
    #[instrument(skip(self, batch, source, destination), fields(batch = batch.index))]
    pub async fn build(
        &self,
        batch: &Batch,
        source: &Address,
        destination: &Address,
    ) -> BatchResult<Option<TransferPlan>> {
        let mut instructions = Vec::with_capacity(batch.tokens.len() * 2 + 1);
        let mut created: HashSet<Address> = HashSet::new();

        for token in &batch.tokens {
            let current = self
                .ledger
                .token_account_balance(&token.account)
                .await
                .map_err(BatchError::BuildFailed)?;
            let amount = match current {
                Some(amount) if amount > 0 => amount,
                _ => {
                    debug!(mint = %token.mint.short(), "Holding emptied since scan, skipping");
                    continue;
                }
            };

            let target = self.ledger.sub_account_address(destination, &token.mint);
            if target == token.account {
                debug!(mint = %token.mint.short(), "Holding already at destination, skipping");
                continue;
            }

            if !created.contains(&target)
                && !self
                    .ledger
                    .account_exists(&target)
                    .await
                    .map_err(BatchError::BuildFailed)?
            {
                trace!(mint = %token.mint.short(), "Destination sub-account missing");
                instructions.push(Instruction::CreateSubAccount {
                    payer: *source,
                    owner: *destination,
                    mint: token.mint,
                    address: target,
                });
                created.insert(target);
            }

            instructions.push(Instruction::TokenTransfer {
                mint: token.mint,
                source: token.account,
                destination: target,
                authority: *source,
                amount,
                decimals: token.decimals,
            });
        }

        if let Some(sweep) = batch.native_sweep {
            let amount = sweep.amount();
            if amount > 0 {
                instructions.push(Instruction::NativeTransfer {
                    from: *source,
                    to: *destination,
                    amount,
                });
            }
        }

        if instructions.is_empty() {
            return Ok(None);
        }

        Ok(Some(TransferPlan {
            batch_index: batch.index,
            fee_payer: *source,
            instructions,
        }))
    }
}
