//! Error types for the sweep domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ChainError`] - Ledger read / RPC errors
//! - [`SignerError`] - External signer refusals
//! - [`SubmitError`] - Transaction transport errors
//! - [`BatchError`] - Per-batch failures, recorded in the run result
//! - [`SweepError`] - Pre-flight errors raised to the caller
//!
//! Error conversion is automatic via `From` implementations where a
//! lower-level error has exactly one meaning at the higher level.

use thiserror::Error;

use crate::models::{Address, BatchState};

// =============================================================================
// Chain Errors
// =============================================================================

/// Ledger RPC and connectivity errors.
///
/// These errors occur when reading balances, probing accounts or fetching
/// anchors from the remote ledger (or the optional balance index).
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Transport-level connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request returned an error.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// RPC response could not be interpreted.
    #[error("Invalid response for {method}: {message}")]
    InvalidResponse {
        /// RPC method that produced the response.
        method: String,
        /// What was wrong with it.
        message: String,
    },

    /// Request timed out.
    #[error("Timeout waiting for {0}")]
    Timeout(String),
}

// =============================================================================
// Signer / Submission Errors
// =============================================================================

/// Errors surfaced by the external signer.
#[derive(Debug, Clone, Error)]
pub enum SignerError {
    /// The user rejected the request or the wallet is disconnected.
    #[error("Signer declined: {0}")]
    Declined(String),

    /// The instruction set cannot be expressed as a ledger transaction.
    #[error("Cannot encode transaction: {0}")]
    Encoding(String),
}

/// Transaction transport errors.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// Send failed after the transport's own retry budget.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Confirmation status could not be read.
    #[error("Confirmation unavailable: {0}")]
    ConfirmationUnavailable(String),
}

// =============================================================================
// Batch Errors
// =============================================================================

/// Failure of a single batch.
///
/// Batch errors never abort a run: the sequencer records them in the
/// [`crate::models::RunResult`] and proceeds with the next batch.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// An existence probe or balance re-read failed while building the plan.
    #[error("Failed to build batch: {0}")]
    BuildFailed(ChainError),

    /// No fresh anchor could be fetched.
    #[error("Anchor unavailable: {0}")]
    AnchorUnavailable(ChainError),

    /// The signer refused this batch.
    #[error("Signer declined: {0}")]
    SignerDeclined(String),

    /// The signer could not produce a transaction for this batch.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Transport send error after the retry budget was exhausted.
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// Finality not observed before the anchor expired.
    ///
    /// The transaction may still land later; it is never re-sent.
    #[error("Confirmation timeout for transaction {transaction}")]
    ConfirmationTimeout {
        /// Identifier returned by the submitter.
        transaction: String,
    },

    /// Confirmation polling itself failed.
    #[error("Confirmation failed for transaction {transaction}: {message}")]
    ConfirmationFailed {
        /// Identifier returned by the submitter.
        transaction: String,
        /// Underlying error.
        message: String,
    },

    /// A destination sub-account creation instruction was rejected.
    #[error("Destination account creation failed for mint {mint}: {reason}")]
    AccountCreationFailed {
        /// Asset whose destination could not be created.
        mint: Address,
        /// Ledger-reported reason.
        reason: String,
    },

    /// The transaction landed but one of its instructions failed.
    #[error("Transaction {transaction} failed: {reason}")]
    TransactionFailed {
        /// Identifier returned by the submitter.
        transaction: String,
        /// Ledger-reported reason.
        reason: String,
    },
}

impl BatchError {
    /// Stable label used in metrics and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BuildFailed(_) => "build_failed",
            Self::AnchorUnavailable(_) => "anchor_unavailable",
            Self::SignerDeclined(_) => "signer_declined",
            Self::SigningFailed(_) => "signing_failed",
            Self::SubmissionFailed(_) => "submission_failed",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::ConfirmationFailed { .. } => "confirmation_failed",
            Self::AccountCreationFailed { .. } => "account_creation_failed",
            Self::TransactionFailed { .. } => "transaction_failed",
        }
    }

    /// Last state the batch reached before failing.
    pub fn stage(&self) -> BatchState {
        match self {
            Self::BuildFailed(_) | Self::AnchorUnavailable(_) => BatchState::Built,
            Self::SignerDeclined(_) | Self::SigningFailed(_) | Self::SubmissionFailed(_) => {
                BatchState::AnchorAcquired
            }
            Self::ConfirmationTimeout { .. }
            | Self::ConfirmationFailed { .. }
            | Self::AccountCreationFailed { .. }
            | Self::TransactionFailed { .. } => BatchState::Submitted,
        }
    }
}

impl From<SignerError> for BatchError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Declined(reason) => Self::SignerDeclined(reason),
            SignerError::Encoding(reason) => Self::SigningFailed(reason),
        }
    }
}

// =============================================================================
// Sweep Errors
// =============================================================================

/// Top-level errors raised to the caller before any batch is submitted.
///
/// Everything that happens after planning is reported through the
/// [`crate::models::RunResult`] instead.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Both the fast balance index and the ledger failed.
    #[error("Balances unavailable for {account}: {ledger}")]
    BalancesUnavailable {
        /// Account that was scanned.
        account: Address,
        /// Fast index failure, if an index was configured.
        index: Option<ChainError>,
        /// Ledger failure.
        ledger: ChainError,
    },

    /// Another run is active for the same source account.
    #[error("Sweep already in progress for {0}")]
    RunInProgress(Address),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for caller-facing sweep operations.
pub type SweepResult<T> = Result<T, SweepError>;

/// Result type for ledger operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Result type for per-batch operations.
pub type BatchResult<T> = Result<T, BatchError>;
