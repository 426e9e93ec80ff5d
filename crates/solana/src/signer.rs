//! Local keypair signer.

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{debug, instrument};

use sweeper_core::error::SignerError;
use sweeper_core::models::Address;
use sweeper_core::ports::{SignedTransaction, TransactionSigner, UnsignedTransaction};

use crate::instructions::{encode, to_address, to_pubkey};

/// Signs legacy transactions with a keypair held in memory.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn fee_payer(&self) -> Address {
        to_address(&self.keypair.pubkey())
    }

    #[instrument(skip_all, fields(instructions = tx.instructions.len()))]
    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, SignerError> {
        if tx.fee_payer != self.fee_payer() {
            return Err(SignerError::Declined(format!(
                "fee payer {} is not this signer",
                tx.fee_payer
            )));
        }

        let instructions = tx
            .instructions
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SignerError::Encoding)?;
        let blockhash = Hash::new_from_array(tx.anchor.hash.0);
        let message =
            Message::new_with_blockhash(&instructions, Some(&to_pubkey(&tx.fee_payer)), &blockhash);

        let mut transaction = Transaction::new_unsigned(message);
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| SignerError::Encoding(e.to_string()))?;

        let bytes =
            bincode::serialize(&transaction).map_err(|e| SignerError::Encoding(e.to_string()))?;
        debug!(size = bytes.len(), "Transaction signed");

        Ok(SignedTransaction { bytes })
    }
}
