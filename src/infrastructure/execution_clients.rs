//! Execution collaborator clients.
//!
//! `JupiterQuoter` prices swap routes through the Jupiter aggregator.
//! `TransactionService` builds and submits transactions through an external
//! transaction/signer service (this process never holds keys) and polls
//! the chain for confirmation via `getSignatureStatuses`.

use crate::domain::entities::decision::StrategyDecision;
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::errors::{ConfigError, ExecutionError};
use crate::domain::repositories::execution::{
    BuiltTransaction, ConfirmationStatus, InstructionBuilder, SwapQuote, SwapQuoter,
    TransactionBroadcaster,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

pub const JUPITER_QUOTE_API: &str = "https://quote-api.jup.ag/v6/quote";

/// Map a failed HTTP interaction onto the execution error taxonomy.
fn classify_reqwest_error(err: reqwest::Error) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::Timeout(err.to_string())
    } else {
        ExecutionError::TransientNetwork(err.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> ExecutionError {
    let lowered = body.to_lowercase();
    if lowered.contains("insufficient") {
        ExecutionError::InsufficientFunds(body.to_string())
    } else if status.is_client_error() {
        ExecutionError::InvalidParameters(format!("{}: {}", status, body))
    } else {
        ExecutionError::TransientNetwork(format!("{}: {}", status, body))
    }
}

pub struct JupiterQuoter {
    client: reqwest::Client,
    base_url: String,
}

impl JupiterQuoter {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("quote client: {}", e)))?;
        Ok(JupiterQuoter { client, base_url })
    }
}

#[async_trait]
impl SwapQuoter for JupiterQuoter {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_usd: f64,
    ) -> Result<SwapQuote, ExecutionError> {
        if amount_usd <= 0.0 {
            return Err(ExecutionError::InvalidParameters(format!(
                "quote amount {} must be positive",
                amount_usd
            )));
        }
        // Notional expressed in micro-USD of the input leg.
        let amount_micro = (amount_usd * 1e6) as u64;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", &amount_micro.to_string()),
            ])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(classify_reqwest_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        debug!(input_mint, output_mint, amount_usd, "jupiter quote obtained");
        Ok(SwapQuote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount_usd,
            // The raw quote body rides along as the opaque route handle.
            route_ref: body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    transaction: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    signature: String,
}

/// Client for the external transaction/signer service plus chain
/// confirmation polling.
pub struct TransactionService {
    client: reqwest::Client,
    signer_url: String,
    rpc_url: String,
}

impl TransactionService {
    pub fn new(
        signer_url: String,
        rpc_url: String,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("transaction client: {}", e)))?;
        Ok(TransactionService {
            client,
            signer_url,
            rpc_url,
        })
    }

    async fn post_signer(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<String, ExecutionError> {
        let response = self
            .client
            .post(format!("{}{}", self.signer_url, path))
            .json(&payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl InstructionBuilder for TransactionService {
    async fn build(
        &self,
        position: &CanonicalPosition,
        decision: &StrategyDecision,
        quote: Option<&SwapQuote>,
    ) -> Result<BuiltTransaction, ExecutionError> {
        let payload = json!({
            "position": position.summary(),
            "decision": decision.to_payload(),
            "route": quote.map(|q| q.route_ref.clone()),
        });
        let body = self.post_signer("/transactions/build", payload).await?;
        let parsed: BuildResponse = serde_json::from_str(&body)
            .map_err(|e| ExecutionError::InvalidParameters(format!("build response: {}", e)))?;
        Ok(BuiltTransaction {
            payload_b64: parsed.transaction,
        })
    }
}

#[async_trait]
impl TransactionBroadcaster for TransactionService {
    async fn broadcast(&self, tx: &BuiltTransaction) -> Result<String, ExecutionError> {
        let body = self
            .post_signer(
                "/transactions/submit",
                json!({ "transaction": tx.payload_b64 }),
            )
            .await?;
        let parsed: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| ExecutionError::InvalidParameters(format!("submit response: {}", e)))?;
        info!(signature = %parsed.signature, "transaction submitted");
        Ok(parsed.signature)
    }

    async fn confirmation_status(
        &self,
        tx_reference: &str,
    ) -> Result<ConfirmationStatus, ExecutionError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getSignatureStatuses",
            "params": [[tx_reference], { "searchTransactionHistory": true }],
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(classify_reqwest_error)?;

        let status = &body["result"]["value"][0];
        if status.is_null() {
            // Not yet visible to the cluster.
            return Ok(ConfirmationStatus::Processed);
        }
        if !status["err"].is_null() {
            return Ok(ConfirmationStatus::Failed);
        }
        match status["confirmationStatus"].as_str() {
            Some("finalized") => Ok(ConfirmationStatus::Finalized),
            Some("confirmed") => Ok(ConfirmationStatus::Confirmed),
            _ => Ok(ConfirmationStatus::Processed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(
                reqwest::StatusCode::BAD_REQUEST,
                "insufficient lamports for fee"
            ),
            ExecutionError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "bad mint"),
            ExecutionError::InvalidParameters(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY, "upstream"),
            ExecutionError::TransientNetwork(_)
        ));
    }
}
