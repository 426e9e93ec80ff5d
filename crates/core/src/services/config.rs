//! Configuration for the sweep services.

use std::time::Duration;

use crate::error::{SweepError, SweepResult};
use crate::models::FinalityTier;

/// Default number of tokens per transaction.
///
/// Five (create + transfer) pairs plus a native transfer stay under the
/// ledger's per-transaction size and compute ceiling.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

/// Default native floor kept on the source account (0.002 of a 9-decimal unit).
pub const DEFAULT_RENT_EXEMPT_RESERVE: u64 = 2_000_000;

// =============================================================================
// Sweep Split
// =============================================================================

/// How the usable native balance is split across the run.
///
/// The majority tranche rides with the final token batch; the remainder is
/// sent in a trailing zero-token batch, keeping the native transfer out of
/// transactions already near their compute ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSplit {
    /// Percentage attached to the last token batch.
    pub final_batch_percent: u8,
    /// Percentage sent by the trailing batch.
    pub trailing_percent: u8,
}

impl SweepSplit {
    pub fn new(final_batch_percent: u8, trailing_percent: u8) -> SweepResult<Self> {
        let split = Self {
            final_batch_percent,
            trailing_percent,
        };
        split.validate()?;
        Ok(split)
    }

    pub fn validate(&self) -> SweepResult<()> {
        let total = u16::from(self.final_batch_percent) + u16::from(self.trailing_percent);
        if total > 100 {
            return Err(SweepError::Config(format!(
                "sweep split {}/{} exceeds 100%",
                self.final_batch_percent, self.trailing_percent
            )));
        }
        Ok(())
    }
}

impl Default for SweepSplit {
    fn default() -> Self {
        Self {
            final_batch_percent: 70,
            trailing_percent: 30,
        }
    }
}

// =============================================================================
// Sweep Config
// =============================================================================

/// Configuration for a [`super::SweepService`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Maximum tokens per batch.
    pub max_batch_size: usize,
    /// Native floor never swept.
    pub rent_exempt_reserve: u64,
    /// Native tranche percentages.
    pub sweep_split: SweepSplit,
    /// Finality tier for reads, anchors and confirmation.
    pub finality: FinalityTier,
    /// Transport-level resend budget per transaction.
    pub max_send_retries: u32,
    /// Skip pre-submission validation (off by default).
    pub skip_preflight: bool,
    /// Delay before the post-run balance refresh.
    pub settle_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            rent_exempt_reserve: DEFAULT_RENT_EXEMPT_RESERVE,
            sweep_split: SweepSplit::default(),
            finality: FinalityTier::Confirmed,
            max_send_retries: 3,
            skip_preflight: false,
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> SweepResult<()> {
        if self.max_batch_size == 0 {
            return Err(SweepError::Config("max_batch_size must be at least 1".into()));
        }
        self.sweep_split.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SweepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweep_split, SweepSplit::new(70, 30).unwrap());
        assert!(!config.skip_preflight);
    }

    #[test]
    fn test_split_over_hundred_rejected() {
        assert!(matches!(SweepSplit::new(80, 30), Err(SweepError::Config(_))));
        assert!(SweepSplit::new(100, 0).is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = SweepConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
