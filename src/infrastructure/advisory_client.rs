//! HTTP advisory client.
//!
//! Posts a position summary to the external advisory service and parses the
//! structured suggestion back. The service is untrusted: nothing here is
//! validated beyond JSON shape. Structural validation happens in the
//! strategy engine, and every failure maps to an `AdvisoryError` the engine
//! degrades on.

use crate::domain::entities::decision::Advisory;
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::entities::risk::RiskLevel;
use crate::domain::errors::{AdvisoryError, ConfigError};
use crate::domain::repositories::advisory::AdvisoryClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AdvisoryResponse {
    strategy: String,
    #[serde(default)]
    suggested_amount_usd: f64,
    #[serde(default)]
    urgency: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

pub struct HttpAdvisoryClient {
    client: reqwest::Client,
    url: String,
}

impl HttpAdvisoryClient {
    /// `timeout` is mandatory: a hung advisory call may never stall a cycle.
    pub fn new(url: String, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("advisory client: {}", e)))?;
        Ok(HttpAdvisoryClient { client, url })
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn suggest(
        &self,
        position: &CanonicalPosition,
        risk_level: RiskLevel,
    ) -> Result<Advisory, AdvisoryError> {
        let request = serde_json::json!({
            "position": position.summary(),
            "risk_level": risk_level,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdvisoryError::Unavailable(format!(
                "http status {}",
                response.status()
            )));
        }

        let parsed: AdvisoryResponse = response
            .json()
            .await
            .map_err(|e| AdvisoryError::InvalidPayload(e.to_string()))?;

        debug!(
            position_key = %position.position_key,
            strategy = %parsed.strategy,
            "advisory received"
        );
        Ok(Advisory {
            strategy: parsed.strategy,
            suggested_amount_usd: parsed.suggested_amount_usd,
            urgency: parsed.urgency,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
        })
    }
}
