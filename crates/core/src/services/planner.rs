//! Batch planner - partitions tokens and places the native sweep tranches.

use tracing::debug;

use crate::models::{Batch, NativeBalance, NativeSweep, TokenBalance};

use super::config::SweepSplit;

// =============================================================================
// Priority
// =============================================================================

/// Caller-supplied ordering key; higher moves first.
pub trait TokenPriority: Send + Sync {
    fn priority(&self, token: &TokenBalance) -> f64;
}

impl<F> TokenPriority for F
where
    F: Fn(&TokenBalance) -> f64 + Send + Sync,
{
    fn priority(&self, token: &TokenBalance) -> f64 {
        self(token)
    }
}

/// Neutral priority: keeps scan order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOrder;

impl TokenPriority for ScanOrder {
    fn priority(&self, _token: &TokenBalance) -> f64 {
        0.0
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Splits tokens into fixed-size batches and attaches native tranches.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    max_batch_size: usize,
    split: SweepSplit,
}

impl BatchPlanner {
    pub fn new(max_batch_size: usize, split: SweepSplit) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            split,
        }
    }

    /// Plan the whole run.
    ///
    /// The usable native balance is captured once here; every tranche is a
    /// fraction of that value.
    pub fn plan<I, P>(&self, tokens: I, native: &NativeBalance, priority: &P) -> Vec<Batch>
    where
        I: IntoIterator<Item = TokenBalance>,
        P: TokenPriority + ?Sized,
    {
        let usable = native.usable();

        let mut ordered: Vec<(f64, TokenBalance)> = tokens
            .into_iter()
            .map(|token| (priority.priority(&token), token))
            .collect();
        // stable: ties keep scan order
        ordered.sort_by(|(a, _), (b, _)| b.total_cmp(a));
        let ordered: Vec<TokenBalance> = ordered.into_iter().map(|(_, token)| token).collect();

        if ordered.is_empty() {
            if usable == 0 {
                debug!("Nothing to sweep");
                return Vec::new();
            }
            return vec![Batch {
                index: 0,
                tokens: Vec::new(),
                native_sweep: Some(NativeSweep {
                    percent: 100,
                    usable,
                }),
            }];
        }

        let mut batches: Vec<Batch> = ordered
            .chunks(self.max_batch_size)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                tokens: chunk.to_vec(),
                native_sweep: None,
            })
            .collect();

        if let Some(last) = batches.last_mut() {
            last.native_sweep = Some(NativeSweep {
                percent: self.split.final_batch_percent,
                usable,
            });
        }

        if usable > 0 && self.split.trailing_percent > 0 {
            batches.push(Batch {
                index: batches.len(),
                tokens: Vec::new(),
                native_sweep: Some(NativeSweep {
                    percent: self.split.trailing_percent,
                    usable,
                }),
            });
        }

        debug!(
            tokens = ordered.len(),
            batches = batches.len(),
            usable,
            "Run planned"
        );
        batches
    }
}
