//! In-memory port implementations for service tests.
//!
//! The submitter applies confirmed instructions to the shared ledger state,
//! so a run's effects are visible to the next scan.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ::metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

use crate::error::{ChainError, ChainResult, SignerError, SubmitError};
use crate::models::{Address, Anchor, AnchorHash, FinalityTier, Instruction};
use crate::ports::{
    BalanceIndex, ConfirmationStatus, IndexedBalance, LedgerReader, SendOptions,
    SignedTransaction, TokenHolding, TransactionSigner, TransactionSubmitter,
    UnsignedTransaction,
};

pub(crate) fn addr(byte: u8) -> Address {
    Address([byte; 32])
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone)]
struct Holding {
    account: Address,
    owner: Address,
    mint: Address,
    amount: u128,
    decimals: u8,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    native: HashMap<Address, u64>,
    holdings: Vec<Holding>,
    existing: HashSet<Address>,
    anchor_seq: u64,
}

impl LedgerState {
    fn holding_mut(&mut self, account: &Address) -> Option<&mut Holding> {
        self.holdings.iter_mut().find(|h| &h.account == account)
    }

    fn apply(&mut self, ix: &Instruction) -> Result<(), String> {
        match ix {
            Instruction::CreateSubAccount {
                owner,
                mint,
                address,
                ..
            } => {
                if self.existing.contains(address) {
                    return Err("account already in use".into());
                }
                self.existing.insert(*address);
                self.holdings.push(Holding {
                    account: *address,
                    owner: *owner,
                    mint: *mint,
                    amount: 0,
                    decimals: 0,
                });
            }
            Instruction::TokenTransfer {
                source,
                destination,
                amount,
                decimals,
                ..
            } => {
                let src = self.holding_mut(source).ok_or("source missing")?;
                if src.amount < *amount {
                    return Err("insufficient funds".into());
                }
                src.amount -= amount;
                let dst = self
                    .holding_mut(destination)
                    .ok_or("destination missing")?;
                dst.amount += amount;
                dst.decimals = *decimals;
            }
            Instruction::NativeTransfer { from, to, amount } => {
                let balance = self.native.entry(*from).or_default();
                if *balance < *amount {
                    return Err("insufficient lamports".into());
                }
                *balance -= amount;
                *self.native.entry(*to).or_default() += amount;
            }
        }
        Ok(())
    }
}

/// Switches that make individual ledger reads fail.
#[derive(Debug, Default)]
pub(crate) struct LedgerFaults {
    pub native: bool,
    pub listing: bool,
    pub probe: bool,
    pub anchor: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    pub faults: Arc<Mutex<LedgerFaults>>,
    pub anchor_calls: Arc<AtomicUsize>,
    pub scan_calls: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native(&self, owner: Address, units: u64) {
        let mut state = self.state.lock().unwrap();
        state.native.insert(owner, units);
        state.existing.insert(owner);
    }

    /// Add a derived holding for `owner`; returns the holding account.
    pub fn add_holding(&self, owner: Address, mint: Address, amount: u128, decimals: u8) -> Address {
        let account = self.sub_account_address(&owner, &mint);
        self.add_holding_at(account, owner, mint, amount, decimals)
    }

    /// Add a holding at an explicit (possibly non-derived) address.
    pub fn add_holding_at(
        &self,
        account: Address,
        owner: Address,
        mint: Address,
        amount: u128,
        decimals: u8,
    ) -> Address {
        let mut state = self.state.lock().unwrap();
        state.existing.insert(account);
        state.holdings.push(Holding {
            account,
            owner,
            mint,
            amount,
            decimals,
        });
        account
    }

    /// Pre-create the destination's sub-account for `mint`.
    pub fn open_sub_account(&self, owner: Address, mint: Address) -> Address {
        self.add_holding(owner, mint, 0, 0)
    }

    /// Empty a holding behind the pipeline's back.
    pub fn drain(&self, account: &Address) {
        let mut state = self.state.lock().unwrap();
        if let Some(h) = state.holding_mut(account) {
            h.amount = 0;
        }
    }

    pub fn native_of(&self, owner: &Address) -> u64 {
        self.state.lock().unwrap().native.get(owner).copied().unwrap_or(0)
    }

    pub fn token_of(&self, owner: &Address, mint: &Address) -> u128 {
        self.state
            .lock()
            .unwrap()
            .holdings
            .iter()
            .filter(|h| &h.owner == owner && &h.mint == mint)
            .map(|h| h.amount)
            .sum()
    }

    /// Apply a transaction atomically.
    fn execute(&self, instructions: &[Instruction]) -> Result<(), (usize, String)> {
        let mut state = self.state.lock().unwrap();
        let mut next = state.clone();
        for (index, ix) in instructions.iter().enumerate() {
            next.apply(ix).map_err(|reason| (index, reason))?;
        }
        *state = next;
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn native_balance(&self, account: &Address) -> ChainResult<u64> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().unwrap().native {
            return Err(ChainError::RpcError("getBalance unavailable".into()));
        }
        Ok(self.native_of(account))
    }

    async fn token_accounts(&self, account: &Address) -> ChainResult<Vec<TokenHolding>> {
        if self.faults.lock().unwrap().listing {
            return Err(ChainError::RpcError("token listing unavailable".into()));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .holdings
            .iter()
            .filter(|h| &h.owner == account)
            .map(|h| TokenHolding {
                account: h.account,
                mint: h.mint,
                raw_amount: h.amount,
                decimals: h.decimals,
            })
            .collect())
    }

    fn sub_account_address(&self, owner: &Address, mint: &Address) -> Address {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = owner.0[i].wrapping_mul(31) ^ mint.0[(i + 7) % 32].rotate_left(3) ^ 0xa5;
        }
        Address(out)
    }

    async fn account_exists(&self, address: &Address) -> ChainResult<bool> {
        if self.faults.lock().unwrap().probe {
            return Err(ChainError::Timeout("getAccountInfo".into()));
        }
        Ok(self.state.lock().unwrap().existing.contains(address))
    }

    async fn token_account_balance(&self, account: &Address) -> ChainResult<Option<u128>> {
        if self.faults.lock().unwrap().probe {
            return Err(ChainError::Timeout("getAccountInfo".into()));
        }
        let mut state = self.state.lock().unwrap();
        Ok(state.holding_mut(account).map(|h| h.amount))
    }

    async fn latest_anchor(&self, _tier: FinalityTier) -> ChainResult<Anchor> {
        self.anchor_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().unwrap().anchor {
            return Err(ChainError::RpcError("getLatestBlockhash unavailable".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.anchor_seq += 1;
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&state.anchor_seq.to_le_bytes());
        Ok(Anchor {
            hash: AnchorHash(hash),
            last_valid_height: 150 + state.anchor_seq,
        })
    }
}

// =============================================================================
// Signer / Submitter
// =============================================================================

/// Signer and submitter share the list of signed instruction sets; the
/// "signature" is the index into it.
type SignedRegistry = Arc<Mutex<Vec<UnsignedTransaction>>>;

pub(crate) struct MemorySigner {
    payer: Address,
    registry: SignedRegistry,
    calls: AtomicUsize,
    pub decline_calls: Mutex<HashSet<usize>>,
}

#[async_trait]
impl TransactionSigner for MemorySigner {
    fn fee_payer(&self) -> Address {
        self.payer
    }

    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, SignerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.decline_calls.lock().unwrap().contains(&call) {
            return Err(SignerError::Declined("user rejected the request".into()));
        }
        let mut registry = self.registry.lock().unwrap();
        registry.push(tx);
        let index = (registry.len() - 1) as u64;
        Ok(SignedTransaction {
            bytes: index.to_le_bytes().to_vec(),
        })
    }
}

/// One recorded `send` call.
#[derive(Debug, Clone)]
pub(crate) struct SentRecord {
    pub transaction: String,
    pub options: SendOptions,
    pub unsigned: UnsignedTransaction,
}

pub(crate) struct MemorySubmitter {
    ledger: MemoryLedger,
    registry: SignedRegistry,
    pending: Mutex<HashMap<String, UnsignedTransaction>>,
    pub sent: Mutex<Vec<SentRecord>>,
    /// Send-call indices that fail at the transport.
    pub fail_sends: Mutex<HashSet<usize>>,
    /// Forced confirmation status per send-call index (not applied to the ledger).
    pub forced_status: Mutex<HashMap<usize, ConfirmationStatus>>,
    /// Send-call indices whose confirmation polling errors out.
    pub failing_confirmations: Mutex<HashSet<usize>>,
    /// Called with the send-call index once its confirmation resolves.
    pub after_confirm: Mutex<Option<ConfirmHook>>,
}

pub(crate) type ConfirmHook = Box<dyn Fn(usize) + Send + Sync>;

impl MemorySubmitter {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionSubmitter for MemorySubmitter {
    async fn send(
        &self,
        tx: &SignedTransaction,
        options: SendOptions,
    ) -> Result<String, SubmitError> {
        let mut sent = self.sent.lock().unwrap();
        let call = sent.len();
        let index = u64::from_le_bytes(tx.bytes[..8].try_into().unwrap()) as usize;
        let unsigned = self.registry.lock().unwrap()[index].clone();
        let transaction = format!("tx-{call}");
        sent.push(SentRecord {
            transaction: transaction.clone(),
            options,
            unsigned: unsigned.clone(),
        });
        if self.fail_sends.lock().unwrap().contains(&call) {
            return Err(SubmitError::SendFailed("node unhealthy".into()));
        }
        self.pending
            .lock()
            .unwrap()
            .insert(transaction.clone(), unsigned);
        Ok(transaction)
    }

    async fn await_confirmation(
        &self,
        transaction: &str,
        anchor: &Anchor,
        _tier: FinalityTier,
    ) -> Result<ConfirmationStatus, SubmitError> {
        let call: usize = transaction
            .trim_start_matches("tx-")
            .parse()
            .map_err(|_| SubmitError::ConfirmationUnavailable("unknown transaction".into()))?;
        let unsigned = self
            .pending
            .lock()
            .unwrap()
            .remove(transaction)
            .ok_or_else(|| SubmitError::ConfirmationUnavailable("unknown transaction".into()))?;
        assert_eq!(&unsigned.anchor, anchor, "confirmation must use the signing anchor");

        let status = if self.failing_confirmations.lock().unwrap().contains(&call) {
            Err(SubmitError::ConfirmationUnavailable("status endpoint down".into()))
        } else if let Some(status) = self.forced_status.lock().unwrap().get(&call) {
            Ok(status.clone())
        } else {
            match self.ledger.execute(&unsigned.instructions) {
                Ok(()) => Ok(ConfirmationStatus::Confirmed),
                Err((index, reason)) => Ok(ConfirmationStatus::Failed {
                    instruction_index: Some(index),
                    reason,
                }),
            }
        };
        if let Some(hook) = self.after_confirm.lock().unwrap().as_ref() {
            hook(call);
        }
        status
    }
}

/// Signer and submitter bound to the same ledger.
pub(crate) fn memory_wallet(ledger: &MemoryLedger, payer: Address) -> (MemorySigner, MemorySubmitter) {
    let registry: SignedRegistry = Arc::default();
    let signer = MemorySigner {
        payer,
        registry: registry.clone(),
        calls: AtomicUsize::new(0),
        decline_calls: Mutex::default(),
    };
    let submitter = MemorySubmitter {
        ledger: ledger.clone(),
        registry,
        pending: Mutex::default(),
        sent: Mutex::default(),
        fail_sends: Mutex::default(),
        forced_status: Mutex::default(),
        failing_confirmations: Mutex::default(),
        after_confirm: Mutex::default(),
    };
    (signer, submitter)
}

// =============================================================================
// Balance Index
// =============================================================================

pub(crate) struct StaticIndex {
    response: ChainResult<Vec<IndexedBalance>>,
    pub calls: AtomicUsize,
}

impl StaticIndex {
    pub fn answering(balances: Vec<IndexedBalance>) -> Self {
        Self {
            response: Ok(balances),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(ChainError::ConnectionFailed("index unreachable".into())),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BalanceIndex for StaticIndex {
    async fn indexed_balances(&self, _account: &Address) -> ChainResult<Vec<IndexedBalance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Recorder that counts batch duration samples.
#[derive(Default)]
pub(crate) struct DurationRecorder {
    pub samples: Arc<AtomicUsize>,
}

impl Recorder for DurationRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        if key.name() == "sweep_batch_duration_seconds" {
            self.samples.fetch_add(1, Ordering::SeqCst);
        }
        Histogram::noop()
    }
}
