//! Mapping from domain instructions to Solana program instructions.

use solana_sdk::instruction::{AccountMeta, Instruction as SolanaInstruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{system_instruction, system_program};

use sweeper_core::models::{Address, Instruction};

/// SPL Token program.
pub const TOKEN_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// Associated Token Account program.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

const ATA_CREATE: u8 = 0;
const TOKEN_TRANSFER_CHECKED: u8 = 12;

pub fn to_pubkey(address: &Address) -> Pubkey {
    Pubkey::new_from_array(address.0)
}

pub fn to_address(pubkey: &Pubkey) -> Address {
    Address(pubkey.to_bytes())
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Address, mint: &Address) -> Address {
    let (pda, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    );
    to_address(&pda)
}

/// Encode one domain instruction.
///
/// Fails only when a token amount does not fit the program's `u64`.
pub fn encode(instruction: &Instruction) -> Result<SolanaInstruction, String> {
    match instruction {
        Instruction::CreateSubAccount {
            payer,
            owner,
            mint,
            address,
        } => Ok(SolanaInstruction {
            program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(to_pubkey(payer), true),
                AccountMeta::new(to_pubkey(address), false),
                AccountMeta::new_readonly(to_pubkey(owner), false),
                AccountMeta::new_readonly(to_pubkey(mint), false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            ],
            data: vec![ATA_CREATE],
        }),
        Instruction::TokenTransfer {
            mint,
            source,
            destination,
            authority,
            amount,
            decimals,
        } => {
            let amount = u64::try_from(*amount)
                .map_err(|_| format!("amount {amount} of mint {mint} exceeds u64"))?;
            let mut data = Vec::with_capacity(10);
            data.push(TOKEN_TRANSFER_CHECKED);
            data.extend_from_slice(&amount.to_le_bytes());
            data.push(*decimals);
            Ok(SolanaInstruction {
                program_id: TOKEN_PROGRAM_ID,
                accounts: vec![
                    AccountMeta::new(to_pubkey(source), false),
                    AccountMeta::new_readonly(to_pubkey(mint), false),
                    AccountMeta::new(to_pubkey(destination), false),
                    AccountMeta::new_readonly(to_pubkey(authority), true),
                ],
                data,
            })
        }
        Instruction::NativeTransfer { from, to, amount } => Ok(system_instruction::transfer(
            &to_pubkey(from),
            &to_pubkey(to),
            *amount,
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn key(s: &str) -> Address {
        to_address(&Pubkey::from_str(s).unwrap())
    }

    #[test]
    fn test_ata_derivation_known_vector() {
        // USDC ATA of a well-known wallet
        let owner = key("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU");
        let mint = key("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        let derived = associated_token_address(&owner, &mint);

        let (expected, _) = Pubkey::find_program_address(
            &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
            &ASSOCIATED_TOKEN_PROGRAM_ID,
        );
        assert_eq!(to_pubkey(&derived), expected);
        assert!(!to_pubkey(&derived).is_on_curve());
        assert_ne!(derived, associated_token_address(&mint, &owner));
    }

    #[test]
    fn test_transfer_checked_layout() {
        let ix = encode(&Instruction::TokenTransfer {
            mint: Address([2; 32]),
            source: Address([3; 32]),
            destination: Address([4; 32]),
            authority: Address([5; 32]),
            amount: 1_500_000,
            decimals: 6,
        })
        .unwrap();

        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
        assert_eq!(ix.data, vec![12, 0x60, 0xe3, 0x16, 0, 0, 0, 0, 0, 6]);
        let flags: Vec<_> = ix.accounts.iter().map(|m| (m.is_writable, m.is_signer)).collect();
        assert_eq!(flags, vec![(true, false), (false, false), (true, false), (false, true)]);
        assert_eq!(ix.accounts[1].pubkey, Pubkey::new_from_array([2; 32]));
    }

    #[test]
    fn test_oversized_token_amount_rejected() {
        let err = encode(&Instruction::TokenTransfer {
            mint: Address([2; 32]),
            source: Address([3; 32]),
            destination: Address([4; 32]),
            authority: Address([5; 32]),
            amount: u128::from(u64::MAX) + 1,
            decimals: 0,
        })
        .unwrap_err();
        assert!(err.contains("exceeds u64"));
    }

    #[test]
    fn test_create_account_layout() {
        let ix = encode(&Instruction::CreateSubAccount {
            payer: Address([1; 32]),
            owner: Address([2; 32]),
            mint: Address([3; 32]),
            address: Address([4; 32]),
        })
        .unwrap();

        assert_eq!(ix.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.data, vec![0]);
        assert_eq!(ix.accounts.len(), 6);
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert!(ix.accounts[1].is_writable && !ix.accounts[1].is_signer);
        assert_eq!(ix.accounts[4].pubkey, system_program::id());
        assert_eq!(ix.accounts[5].pubkey, TOKEN_PROGRAM_ID);
    }

    #[test]
    fn test_native_transfer_is_system_transfer() {
        let ix = encode(&Instruction::NativeTransfer {
            from: Address([1; 32]),
            to: Address([2; 32]),
            amount: 998_000_000,
        })
        .unwrap();

        assert_eq!(ix.program_id, system_program::id());
        // SystemInstruction::Transfer discriminant then lamports
        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..], &998_000_000u64.to_le_bytes());
    }
}
