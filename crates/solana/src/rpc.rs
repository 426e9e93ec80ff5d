//! Solana JSON-RPC client implementing the ledger and submission ports.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument, trace, warn};

use sweeper_core::error::{ChainError, ChainResult, SubmitError};
use sweeper_core::models::{Address, Anchor, AnchorHash, FinalityTier};
use sweeper_core::ports::{
    ConfirmationStatus, LedgerReader, SendOptions, SignedTransaction, TokenHolding,
    TransactionSubmitter,
};

use crate::instructions::{TOKEN_PROGRAM_ID, associated_token_address, to_address, to_pubkey};

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct SolanaRpcConfig {
    /// HTTP JSON-RPC endpoint.
    pub url: String,
    /// Commitment used for balance reads.
    pub commitment: FinalityTier,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay between confirmation polls.
    pub poll_interval: Duration,
}

impl Default for SolanaRpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: FinalityTier::Confirmed,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// JSON-RPC adapter implementing [`LedgerReader`] and [`TransactionSubmitter`].
pub struct SolanaRpcClient {
    http: reqwest::Client,
    config: SolanaRpcConfig,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(config: SolanaRpcConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call and return its `result` member.
    async fn rpc_call(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "RPC request");

        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| invalid(method, format!("failed to parse response JSON: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(ChainError::RpcError(format!("{method}: {error}")));
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| invalid(method, "missing result"))
    }

    async fn block_height(&self, tier: FinalityTier) -> ChainResult<u64> {
        let result = self
            .rpc_call("getBlockHeight", json!([{ "commitment": tier.as_str() }]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| invalid("getBlockHeight", "height is not an integer"))
    }

    async fn signature_status(&self, signature: &str) -> ChainResult<Option<SignatureStatus>> {
        let result = self
            .rpc_call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        parse_signature_status(&result)
    }
}

// =============================================================================
// Ledger reads
// =============================================================================

#[async_trait]
impl LedgerReader for SolanaRpcClient {
    #[instrument(skip(self), fields(account = %account.short()))]
    async fn native_balance(&self, account: &Address) -> ChainResult<u64> {
        let result = self
            .rpc_call(
                "getBalance",
                json!([to_pubkey(account).to_string(), { "commitment": self.config.commitment.as_str() }]),
            )
            .await?;
        result["value"]
            .as_u64()
            .ok_or_else(|| invalid("getBalance", "value is not an integer"))
    }

    /// Holdings under the classic SPL Token program; Token-2022 accounts are
    /// not listed.
    #[instrument(skip(self), fields(account = %account.short()))]
    async fn token_accounts(&self, account: &Address) -> ChainResult<Vec<TokenHolding>> {
        let result = self
            .rpc_call(
                "getTokenAccountsByOwner",
                json!([
                    to_pubkey(account).to_string(),
                    { "programId": TOKEN_PROGRAM_ID.to_string() },
                    { "encoding": "jsonParsed", "commitment": self.config.commitment.as_str() }
                ]),
            )
            .await?;
        let holdings = parse_token_accounts(&result)?;
        debug!(count = holdings.len(), "Token accounts listed");
        Ok(holdings)
    }

    fn sub_account_address(&self, owner: &Address, mint: &Address) -> Address {
        associated_token_address(owner, mint)
    }

    async fn account_exists(&self, address: &Address) -> ChainResult<bool> {
        let result = self
            .rpc_call(
                "getAccountInfo",
                json!([
                    to_pubkey(address).to_string(),
                    { "encoding": "base64", "dataSlice": { "offset": 0, "length": 0 }, "commitment": self.config.commitment.as_str() }
                ]),
            )
            .await?;
        Ok(!result["value"].is_null())
    }

    async fn token_account_balance(&self, account: &Address) -> ChainResult<Option<u128>> {
        let result = self
            .rpc_call(
                "getAccountInfo",
                json!([
                    to_pubkey(account).to_string(),
                    { "encoding": "jsonParsed", "commitment": self.config.commitment.as_str() }
                ]),
            )
            .await?;
        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }
        parse_token_amount("getAccountInfo", &value["data"]["parsed"]["info"]).map(Some)
    }

    #[instrument(skip(self))]
    async fn latest_anchor(&self, tier: FinalityTier) -> ChainResult<Anchor> {
        let result = self
            .rpc_call("getLatestBlockhash", json!([{ "commitment": tier.as_str() }]))
            .await?;
        parse_latest_blockhash(&result)
    }
}

// =============================================================================
// Submission
// =============================================================================

#[async_trait]
impl TransactionSubmitter for SolanaRpcClient {
    #[instrument(skip_all, fields(size = tx.bytes.len()))]
    async fn send(&self, tx: &SignedTransaction, options: SendOptions) -> Result<String, SubmitError> {
        let result = self
            .rpc_call(
                "sendTransaction",
                json!([
                    BASE64.encode(&tx.bytes),
                    {
                        "encoding": "base64",
                        "skipPreflight": options.skip_preflight,
                        "maxRetries": options.max_retries,
                        "preflightCommitment": options.preflight_finality.as_str(),
                    }
                ]),
            )
            .await
            .map_err(|e| SubmitError::SendFailed(e.to_string()))?;

        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| SubmitError::SendFailed("signature missing from response".into()))
    }

    #[instrument(skip(self, anchor), fields(last_valid_height = anchor.last_valid_height))]
    async fn await_confirmation(
        &self,
        transaction: &str,
        anchor: &Anchor,
        tier: FinalityTier,
    ) -> Result<ConfirmationStatus, SubmitError> {
        let unavailable = |e: ChainError| SubmitError::ConfirmationUnavailable(e.to_string());

        loop {
            if let Some(status) = self.signature_status(transaction).await.map_err(unavailable)? {
                if let Some(err) = status.err {
                    return Ok(ConfirmationStatus::Failed {
                        instruction_index: instruction_error_index(&err),
                        reason: err.to_string(),
                    });
                }
                if status.reached(tier) {
                    return Ok(ConfirmationStatus::Confirmed);
                }
                trace!(status = ?status.confirmation_status, "Awaiting finality");
            }

            let height = self.block_height(tier).await.map_err(unavailable)?;
            if height > anchor.last_valid_height {
                warn!(height, "Block height passed the anchor's validity window");
                return Ok(ConfirmationStatus::Expired);
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

// =============================================================================
// Response parsing
// =============================================================================

fn invalid(method: &str, message: impl Into<String>) -> ChainError {
    ChainError::InvalidResponse {
        method: method.to_string(),
        message: message.into(),
    }
}

fn transport_error(method: &str, e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout(method.to_string())
    } else if e.is_connect() {
        ChainError::ConnectionFailed(e.to_string())
    } else {
        ChainError::RpcError(format!("{method}: {e}"))
    }
}

fn parse_address(method: &str, value: &Value) -> ChainResult<Address> {
    let s = value
        .as_str()
        .ok_or_else(|| invalid(method, "address is not a string"))?;
    Pubkey::from_str(s)
        .map(|key| to_address(&key))
        .map_err(|e| invalid(method, format!("bad address {s}: {e}")))
}

/// Read `tokenAmount` from a jsonParsed SPL token account `info` object.
fn parse_token_amount(method: &str, info: &Value) -> ChainResult<u128> {
    let amount = info["tokenAmount"]["amount"]
        .as_str()
        .ok_or_else(|| invalid(method, "tokenAmount.amount missing"))?;
    amount
        .parse()
        .map_err(|_| invalid(method, format!("bad token amount {amount}")))
}

fn parse_token_accounts(result: &Value) -> ChainResult<Vec<TokenHolding>> {
    const METHOD: &str = "getTokenAccountsByOwner";

    let entries = result["value"]
        .as_array()
        .ok_or_else(|| invalid(METHOD, "value is not an array"))?;

    entries
        .iter()
        .map(|entry| {
            let info = &entry["account"]["data"]["parsed"]["info"];
            let decimals = info["tokenAmount"]["decimals"]
                .as_u64()
                .and_then(|d| u8::try_from(d).ok())
                .ok_or_else(|| invalid(METHOD, "tokenAmount.decimals missing"))?;
            Ok(TokenHolding {
                account: parse_address(METHOD, &entry["pubkey"])?,
                mint: parse_address(METHOD, &info["mint"])?,
                raw_amount: parse_token_amount(METHOD, info)?,
                decimals,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

fn parse_latest_blockhash(result: &Value) -> ChainResult<Anchor> {
    const METHOD: &str = "getLatestBlockhash";

    let value: LatestBlockhash = serde_json::from_value(result["value"].clone())
        .map_err(|e| invalid(METHOD, e.to_string()))?;
    let hash = Hash::from_str(&value.blockhash)
        .map_err(|e| invalid(METHOD, format!("bad blockhash {}: {e}", value.blockhash)))?;
    Ok(Anchor {
        hash: AnchorHash(hash.to_bytes()),
        last_valid_height: value.last_valid_block_height,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    confirmation_status: Option<String>,
    err: Option<Value>,
}

impl SignatureStatus {
    fn reached(&self, tier: FinalityTier) -> bool {
        self.confirmation_status
            .as_deref()
            .and_then(|s| FinalityTier::from_str(s).ok())
            .is_some_and(|observed| observed >= tier)
    }
}

fn parse_signature_status(result: &Value) -> ChainResult<Option<SignatureStatus>> {
    let first = &result["value"][0];
    if first.is_null() {
        return Ok(None);
    }
    serde_json::from_value(first.clone())
        .map(Some)
        .map_err(|e| invalid("getSignatureStatuses", e.to_string()))
}

/// Index of the failing instruction in `{"InstructionError": [index, error]}`.
fn instruction_error_index(err: &Value) -> Option<usize> {
    err.get("InstructionError")?
        .get(0)?
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
}
