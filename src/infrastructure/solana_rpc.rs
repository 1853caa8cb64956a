//! Solana JSON-RPC client.
//!
//! Implements the `ChainRpc` capability: an address resolves to raw account
//! bytes or nothing. Account data arrives base64-encoded and is decoded
//! here, so the rest of the system only ever sees byte buffers.

use crate::domain::errors::{ConfigError, RpcError};
use crate::domain::repositories::chain_rpc::{AccountFilter, ChainRpc, RawAccount};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct SolanaRpcClient {
    client: reqwest::Client,
    url: String,
}

impl SolanaRpcClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("rpc client: {}", e)))?;
        Ok(SolanaRpcClient { client, url })
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout
                } else {
                    RpcError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(RpcError::Transport(format!(
                "http status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RpcError::Protocol(format!("invalid json body: {}", e)))?;

        if let Some(err) = body.get("error") {
            return Err(RpcError::Protocol(err.to_string()));
        }
        Ok(body.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

/// Extract and base64-decode `account.data[0]` from an RPC account value.
fn decode_account_data(value: &serde_json::Value) -> Result<Vec<u8>, RpcError> {
    let encoded = value
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.as_str())
        .ok_or_else(|| RpcError::Protocol("account data missing".to_string()))?;
    BASE64
        .decode(encoded)
        .map_err(|e| RpcError::Protocol(format!("account data not base64: {}", e)))
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
    async fn program_accounts(
        &self,
        program_id: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<RawAccount>, RpcError> {
        let rpc_filters: Vec<serde_json::Value> = filters
            .iter()
            .map(|f| {
                json!({
                    "memcmp": { "offset": f.offset, "bytes": f.bytes_base58 }
                })
            })
            .collect();

        let result = self
            .call(
                "getProgramAccounts",
                json!([
                    program_id,
                    {
                        "encoding": "base64",
                        "commitment": "confirmed",
                        "filters": rpc_filters,
                    }
                ]),
            )
            .await?;

        let entries = match result.as_array() {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };

        let mut accounts = Vec::with_capacity(entries.len());
        for entry in entries {
            let pubkey = entry
                .get("pubkey")
                .and_then(|p| p.as_str())
                .ok_or_else(|| RpcError::Protocol("account pubkey missing".to_string()))?
                .to_string();
            let account = entry
                .get("account")
                .ok_or_else(|| RpcError::Protocol("account body missing".to_string()))?;
            accounts.push(RawAccount {
                pubkey,
                data: decode_account_data(account)?,
            });
        }
        debug!(program = program_id, count = accounts.len(), "fetched program accounts");
        Ok(accounts)
    }

    async fn account_info(&self, pubkey: &str) -> Result<Option<RawAccount>, RpcError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([pubkey, { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;

        match result.get("value") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(RawAccount {
                pubkey: pubkey.to_string(),
                data: decode_account_data(value)?,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_account_data() {
        let value = json!({ "data": ["AQID", "base64"] });
        assert_eq!(decode_account_data(&value).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_account_data_rejects_garbage() {
        let value = json!({ "data": ["!!not-base64!!", "base64"] });
        assert!(matches!(
            decode_account_data(&value),
            Err(RpcError::Protocol(_))
        ));
        assert!(matches!(
            decode_account_data(&json!({})),
            Err(RpcError::Protocol(_))
        ));
    }
}
