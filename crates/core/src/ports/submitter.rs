//! Port traits for signing and submitting transactions.

use async_trait::async_trait;

use crate::error::{SignerError, SubmitError};
use crate::models::{Address, Anchor, FinalityTier, Instruction};

/// Instruction set ready to be signed against a fresh anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// Account paying fees.
    pub fee_payer: Address,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
    /// Anchor the signature commits to.
    pub anchor: Anchor,
}

/// Opaque, submittable signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Wire encoding understood by the submitter.
    pub bytes: Vec<u8>,
}

/// Transport options for a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip the node's pre-submission simulation.
    pub skip_preflight: bool,
    /// Transport-level resend budget.
    pub max_retries: u32,
    /// Commitment used by the pre-submission simulation.
    pub preflight_finality: FinalityTier,
}

/// Final confirmation status of a sent transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Requested finality tier reached without error.
    Confirmed,
    /// Anchor validity window elapsed first.
    Expired,
    /// Transaction landed with an error.
    Failed {
        /// Index of the failing instruction, when reported.
        instruction_index: Option<usize>,
        /// Ledger-reported reason.
        reason: String,
    },
}

/// External signer capability (wallet).
///
/// May fail when the user rejects the request or the wallet disconnects.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Identity paying fees for every transaction this signer signs.
    fn fee_payer(&self) -> Address;

    /// Sign an instruction set against its anchor.
    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, SignerError>;
}

/// Port trait for transaction transport.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Send a signed transaction; returns its identifier.
    async fn send(
        &self,
        tx: &SignedTransaction,
        options: SendOptions,
    ) -> Result<String, SubmitError>;

    /// Block until `transaction` reaches `tier` or `anchor` expires.
    async fn await_confirmation(
        &self,
        transaction: &str,
        anchor: &Anchor,
        tier: FinalityTier,
    ) -> Result<ConfirmationStatus, SubmitError>;
}
