//! Domain models for the sweep pipeline.
//!
//! These models are chain-agnostic value objects. Every stage of the
//! pipeline (scan, plan, build, submit) consumes the previous stage's
//! output by value; nothing here is shared or mutated across stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// 32-byte Identifier Types
// =============================================================================

/// Macro to generate 32-byte identifier newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! bytes32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Short form for log fields.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..6])
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

bytes32_newtype!(
    /// 32-byte account address (wallets, mints and sub-accounts alike).
    Address
);

bytes32_newtype!(
    /// 32-byte anchor hash (recent block reference).
    AnchorHash
);

// =============================================================================
// Ledger Primitives
// =============================================================================

/// Confirmation strength reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalityTier {
    Processed,
    Confirmed,
    Finalized,
}

impl FinalityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for FinalityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FinalityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            _ => Err(format!(
                "Invalid finality tier '{}'. Use 'processed', 'confirmed' or 'finalized'.",
                s
            )),
        }
    }
}

/// Short-lived validity token required to submit a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Recent block reference.
    pub hash: AnchorHash,
    /// Last block height at which a transaction using this anchor is valid.
    pub last_valid_height: u64,
}

// =============================================================================
// Balances
// =============================================================================

/// One fungible asset held by the source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Asset identifier.
    pub mint: Address,
    /// Holding account the balance was read from.
    pub account: Address,
    /// Balance in the asset's smallest unit.
    pub raw_amount: u128,
    /// Display scaling factor.
    pub decimals: u8,
}

impl TokenBalance {
    /// Decimal-scaled amount for display and priority heuristics.
    pub fn ui_amount(&self) -> f64 {
        self.raw_amount as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

/// Native-currency balance with its reserve floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBalance {
    /// Balance in the smallest native unit.
    pub amount_units: u64,
    /// Floor kept on the account for upkeep.
    pub rent_exempt_reserve: u64,
}

impl NativeBalance {
    pub fn new(amount_units: u64, rent_exempt_reserve: u64) -> Self {
        Self {
            amount_units,
            rent_exempt_reserve,
        }
    }

    /// `max(0, amount - reserve)`.
    pub fn usable(&self) -> u64 {
        self.amount_units.saturating_sub(self.rent_exempt_reserve)
    }
}

/// Where a balance snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    Index,
    Ledger,
}

/// Lazy, finite, non-restartable sequence of non-zero token balances.
///
/// Produced by a single scan; consuming it is the only way to read it.
/// Re-reading balances requires a new scan.
#[derive(Debug)]
pub struct TokenScan {
    inner: std::vec::IntoIter<TokenBalance>,
}

impl TokenScan {
    /// Wrap scanned balances, dropping empty holdings.
    pub fn new(tokens: Vec<TokenBalance>) -> Self {
        let inner = tokens
            .into_iter()
            .filter(|token| token.raw_amount > 0)
            .collect::<Vec<_>>()
            .into_iter();
        Self { inner }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for TokenScan {
    type Item = TokenBalance;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for TokenScan {}

/// Result of one balance scan.
#[derive(Debug)]
pub struct BalanceSnapshot {
    /// Scanned account.
    pub account: Address,
    /// Native balance and its reserve.
    pub native: NativeBalance,
    /// Non-zero token balances in scan order.
    pub tokens: TokenScan,
    /// Which source answered.
    pub source: BalanceSource,
    /// When the scan completed.
    pub scanned_at: DateTime<Utc>,
}

// =============================================================================
// Planning
// =============================================================================

/// Native sweep fraction attached to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSweep {
    /// Percentage of the usable balance (0..=100).
    pub percent: u8,
    /// Usable native balance captured once at plan time.
    pub usable: u64,
}

impl NativeSweep {
    /// `floor(usable * percent / 100)`, exact in integer arithmetic.
    pub fn amount(&self) -> u64 {
        let amount = u128::from(self.usable) * u128::from(self.percent) / 100;
        // percent <= 100 keeps this within u64
        u64::try_from(amount).unwrap_or(self.usable)
    }
}

/// Ordered group of at most `max_batch_size` tokens plus an optional
/// native sweep tranche.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Position in the run (0-based).
    pub index: usize,
    /// Tokens moved by this batch.
    pub tokens: Vec<TokenBalance>,
    /// Native tranche carried by this batch.
    pub native_sweep: Option<NativeSweep>,
}

// =============================================================================
// Built Transactions
// =============================================================================

/// Chain-agnostic instruction emitted by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    /// Create the destination's sub-account for `mint`, funded by `payer`.
    CreateSubAccount {
        payer: Address,
        owner: Address,
        mint: Address,
        address: Address,
    },
    /// Move `amount` of `mint` between sub-accounts.
    TokenTransfer {
        mint: Address,
        source: Address,
        destination: Address,
        authority: Address,
        amount: u128,
        decimals: u8,
    },
    /// Move native units between wallets.
    NativeTransfer {
        from: Address,
        to: Address,
        amount: u64,
    },
}

/// Ordered instruction sequence for one batch.
///
/// Anchor-sensitive fields are filled by the signer at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Batch this plan was built from.
    pub batch_index: usize,
    /// Account paying fees and funding account creation.
    pub fee_payer: Address,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
}

impl TransferPlan {
    /// Native units moved by this plan.
    pub fn native_amount(&self) -> u64 {
        self.instructions
            .iter()
            .map(|ix| match ix {
                Instruction::NativeTransfer { amount, .. } => *amount,
                _ => 0,
            })
            .sum()
    }

    pub fn token_transfer_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|ix| matches!(ix, Instruction::TokenTransfer { .. }))
            .count()
    }

    pub fn creation_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|ix| matches!(ix, Instruction::CreateSubAccount { .. }))
            .count()
    }
}

// =============================================================================
// Run Outcome
// =============================================================================

/// Per-batch submission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Built,
    AnchorAcquired,
    Submitted,
    Confirmed,
    Failed,
}

/// Terminal status of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Finality observed.
    Confirmed { transaction: String },
    /// Failed at `stage`; `kind` is the stable error label.
    Failed {
        stage: BatchState,
        kind: String,
        reason: String,
    },
    /// Nothing to submit.
    Skipped,
}

/// Outcome of one planned batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Batch index.
    pub index: usize,
    /// Token transfers in the submitted plan.
    pub token_transfers: usize,
    /// Native units of the batch's planned tranche.
    pub native_units: u64,
    /// Terminal status.
    pub status: BatchStatus,
}

impl BatchOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, BatchStatus::Confirmed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, BatchStatus::Failed { .. })
    }
}

/// Aggregate native sweep outcome across all tranches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NativeSweepOutcome {
    /// Every planned native tranche confirmed.
    Sent { units: u64 },
    /// No batch planned a native tranche.
    Skipped,
    /// At least one planned tranche failed or never ran; `units` were still confirmed.
    Failed { units: u64 },
}

/// Aggregate outcome of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Swept account.
    pub source: Address,
    /// Receiving account.
    pub destination: Address,
    /// Outcome per planned batch, in submission order.
    pub batches: Vec<BatchOutcome>,
    /// Batches that reached finality.
    pub confirmed: usize,
    /// Batches with a non-empty plan (confirmed + failed).
    pub attempted: usize,
    /// Batches whose plan was empty.
    pub skipped: usize,
    /// Native sweep outcome.
    pub native_sweep: NativeSweepOutcome,
    /// Run stopped at a batch boundary on request.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn failed(&self) -> usize {
        self.attempted - self.confirmed
    }

    /// True when every attempted batch confirmed and the run was not cut short.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
