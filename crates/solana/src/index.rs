//! HTTP wallet balance index (token-list API).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument};
use url::Url;

use sweeper_core::error::{ChainError, ChainResult};
use sweeper_core::models::Address;
use sweeper_core::ports::{BalanceIndex, IndexedBalance};

use crate::instructions::{to_address, to_pubkey};

/// Address the index uses for native SOL.
const NATIVE_SOL: &str = "So11111111111111111111111111111111111111111";

const METHOD: &str = "token_list";

/// Wallet balance index queried over HTTP.
pub struct HttpBalanceIndex {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpBalanceIndex {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> ChainResult<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("v1/wallet/token_list"))
            .map_err(|e| ChainError::ConnectionFailed(format!("bad index url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl BalanceIndex for HttpBalanceIndex {
    #[instrument(skip(self), fields(account = %account.short()))]
    async fn indexed_balances(&self, account: &Address) -> ChainResult<Vec<IndexedBalance>> {
        let mut request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("wallet", to_pubkey(account).to_string())])
            .header("x-chain", "solana");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ChainError::Timeout(METHOD.into())
            } else {
                ChainError::ConnectionFailed(e.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(ChainError::RpcError(format!(
                "{METHOD}: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(|e| ChainError::InvalidResponse {
            method: METHOD.into(),
            message: e.to_string(),
        })?;

        let balances = parse_token_list(body)?;
        debug!(entries = balances.len(), "Index answered");
        Ok(balances)
    }
}

#[derive(Debug, Deserialize)]
struct TokenListResponse {
    success: bool,
    data: Option<TokenListData>,
}

#[derive(Debug, Deserialize)]
struct TokenListData {
    #[serde(default)]
    items: Vec<TokenListItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenListItem {
    address: String,
    decimals: u8,
    /// Raw balance; the API emits it as a number or a string.
    balance: Value,
    #[serde(default)]
    ui_amount: f64,
}

fn invalid(message: impl Into<String>) -> ChainError {
    ChainError::InvalidResponse {
        method: METHOD.into(),
        message: message.into(),
    }
}

fn parse_raw_amount(balance: &Value) -> ChainResult<u128> {
    match balance {
        Value::String(s) => s.parse().map_err(|_| invalid(format!("bad balance {s}"))),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| invalid(format!("bad balance {n}"))),
        other => Err(invalid(format!("bad balance {other}"))),
    }
}

fn parse_token_list(body: Value) -> ChainResult<Vec<IndexedBalance>> {
    let response: TokenListResponse =
        serde_json::from_value(body).map_err(|e| invalid(e.to_string()))?;
    if !response.success {
        return Err(ChainError::RpcError(format!("{METHOD}: success=false")));
    }
    let data = response.data.ok_or_else(|| invalid("data missing"))?;

    data.items
        .into_iter()
        .map(|item| {
            let mint = if item.address == NATIVE_SOL {
                None
            } else {
                let mint = Pubkey::from_str(&item.address)
                    .map_err(|e| invalid(format!("bad mint {}: {e}", item.address)))?;
                Some(to_address(&mint))
            };
            Ok(IndexedBalance {
                mint,
                raw_amount: parse_raw_amount(&item.balance)?,
                decimals: item.decimals,
                ui_amount: item.ui_amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn test_parse_token_list() {
        let body = json!({
            "success": true,
            "data": {
                "wallet": "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
                "totalUsd": 12.5,
                "items": [
                    { "address": NATIVE_SOL, "decimals": 9, "balance": 1000000000u64, "uiAmount": 1.0, "symbol": "SOL" },
                    { "address": USDC, "decimals": 6, "balance": "2500000", "uiAmount": 2.5, "symbol": "USDC" }
                ]
            }
        });
        let balances = parse_token_list(body).unwrap();

        assert_eq!(balances.len(), 2);
        assert!(balances[0].is_native());
        assert_eq!(balances[0].raw_amount, 1_000_000_000);
        let usdc = balances[1].mint.unwrap();
        assert_eq!(to_pubkey(&usdc).to_string(), USDC);
        assert_eq!(balances[1].raw_amount, 2_500_000);
    }

    #[test]
    fn test_unsuccessful_response_is_an_error() {
        let body = json!({ "success": false, "message": "Unauthorized" });
        assert!(matches!(parse_token_list(body), Err(ChainError::RpcError(_))));
    }

    #[test]
    fn test_bad_mint_is_invalid() {
        let body = json!({
            "success": true,
            "data": { "items": [{ "address": "nope", "decimals": 0, "balance": 1 }] }
        });
        assert!(matches!(
            parse_token_list(body),
            Err(ChainError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_endpoint_join() {
        let index = HttpBalanceIndex::new(
            "https://public-api.birdeye.so/",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            index.endpoint.as_str(),
            "https://public-api.birdeye.so/v1/wallet/token_list"
        );
    }
}
