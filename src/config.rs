use crate::domain::entities::risk::RiskThresholds;
use crate::domain::errors::ConfigError;
use crate::domain::services::strategy_engine::StrategyTargets;
use std::time::Duration;

/// Runtime configuration for the monitoring agent.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Solana JSON-RPC endpoint.
    pub rpc_url: String,
    /// Wallets whose lending positions are monitored.
    pub watched_owners: Vec<String>,
    pub check_interval_seconds: u64,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_ms: u64,
    pub cycle_timeout_ms: u64,

    // Risk classification thresholds (health factor)
    pub warn_threshold: f64,
    pub critical_threshold: f64,
    pub emergency_threshold: f64,

    // Closed-form rebalance targets
    pub repay_target_hf: f64,
    pub topup_target_hf: f64,

    // Advisory service (optional)
    pub advisory_url: Option<String>,
    pub advisory_timeout_ms: u64,
    pub min_confidence_threshold: f64,

    // Execution collaborators
    pub quote_api_url: String,
    pub signer_service_url: String,
    pub execution_timeout_ms: u64,
    pub execution_max_attempts: u32,
    pub confirmation_timeout_ms: u64,
    pub idempotency_bucket_seconds: i64,

    // Persistence and status surface
    pub database_url: String,
    pub status_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            watched_owners: Vec::new(),
            check_interval_seconds: 60,
            max_concurrent_fetches: 8,
            fetch_timeout_ms: 10_000,
            cycle_timeout_ms: 120_000,

            warn_threshold: 1.5,
            critical_threshold: 1.2,
            emergency_threshold: 1.05,

            repay_target_hf: 1.5,
            topup_target_hf: 2.0,

            advisory_url: None,
            advisory_timeout_ms: 15_000,
            min_confidence_threshold: 0.7,

            quote_api_url: "https://quote-api.jup.ag/v6/quote".to_string(),
            signer_service_url: "http://127.0.0.1:8787".to_string(),
            execution_timeout_ms: 30_000,
            execution_max_attempts: 3,
            confirmation_timeout_ms: 30_000,
            idempotency_bucket_seconds: 300,

            database_url: "sqlite://data/solguard.db".to_string(),
            status_port: 3000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults (with a warning) on unparseable or out-of-range values.
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            match url::Url::parse(&url) {
                Ok(_) => config.rpc_url = url,
                Err(e) => {
                    tracing::warn!(
                        "Invalid SOLANA_RPC_URL '{}': {}, using default: {}",
                        url,
                        e,
                        config.rpc_url
                    );
                }
            }
        }

        if let Ok(owners) = std::env::var("WATCHED_OWNERS") {
            config.watched_owners = owners
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(interval) = std::env::var("CHECK_INTERVAL_SECONDS") {
            match interval.parse::<u64>() {
                Ok(value) if (5..=3600).contains(&value) => {
                    config.check_interval_seconds = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "CHECK_INTERVAL_SECONDS {} out of range [5, 3600], using default: {}",
                        value,
                        config.check_interval_seconds
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse CHECK_INTERVAL_SECONDS '{}': {}, using default: {}",
                        interval,
                        e,
                        config.check_interval_seconds
                    );
                }
            }
        }

        if let Ok(fetches) = std::env::var("MAX_CONCURRENT_FETCHES") {
            if let Ok(value) = fetches.parse::<usize>() {
                if (1..=64).contains(&value) {
                    config.max_concurrent_fetches = value;
                }
            }
        }

        if let Ok(timeout) = std::env::var("FETCH_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (500..=60_000).contains(&value) {
                    config.fetch_timeout_ms = value;
                }
            }
        }

        if let Ok(timeout) = std::env::var("CYCLE_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (5_000..=600_000).contains(&value) {
                    config.cycle_timeout_ms = value;
                }
            }
        }

        if let Ok(warn) = std::env::var("WARN_THRESHOLD") {
            if let Ok(value) = warn.parse::<f64>() {
                config.warn_threshold = value;
            }
        }

        if let Ok(critical) = std::env::var("CRITICAL_THRESHOLD") {
            if let Ok(value) = critical.parse::<f64>() {
                config.critical_threshold = value;
            }
        }

        if let Ok(emergency) = std::env::var("EMERGENCY_THRESHOLD") {
            if let Ok(value) = emergency.parse::<f64>() {
                config.emergency_threshold = value;
            }
        }

        if let Ok(target) = std::env::var("REPAY_TARGET_HF") {
            if let Ok(value) = target.parse::<f64>() {
                config.repay_target_hf = value;
            }
        }

        if let Ok(target) = std::env::var("TOPUP_TARGET_HF") {
            if let Ok(value) = target.parse::<f64>() {
                config.topup_target_hf = value;
            }
        }

        if let Ok(advisory_url) = std::env::var("ADVISORY_URL") {
            if !advisory_url.trim().is_empty() {
                config.advisory_url = Some(advisory_url);
            }
        }

        if let Ok(timeout) = std::env::var("ADVISORY_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (1_000..=60_000).contains(&value) {
                    config.advisory_timeout_ms = value;
                }
            }
        }

        if let Ok(threshold) = std::env::var("MIN_CONFIDENCE_THRESHOLD") {
            match threshold.parse::<f64>() {
                Ok(value) if (0.0..=1.0).contains(&value) => {
                    config.min_confidence_threshold = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "MIN_CONFIDENCE_THRESHOLD {} outside [0.0, 1.0], using default: {}",
                        value,
                        config.min_confidence_threshold
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MIN_CONFIDENCE_THRESHOLD '{}': {}, using default: {}",
                        threshold,
                        e,
                        config.min_confidence_threshold
                    );
                }
            }
        }

        if let Ok(url) = std::env::var("QUOTE_API_URL") {
            if url::Url::parse(&url).is_ok() {
                config.quote_api_url = url;
            }
        }

        if let Ok(url) = std::env::var("SIGNER_SERVICE_URL") {
            if url::Url::parse(&url).is_ok() {
                config.signer_service_url = url;
            }
        }

        if let Ok(timeout) = std::env::var("EXECUTION_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (1_000..=120_000).contains(&value) {
                    config.execution_timeout_ms = value;
                }
            }
        }

        if let Ok(attempts) = std::env::var("EXECUTION_MAX_ATTEMPTS") {
            if let Ok(value) = attempts.parse::<u32>() {
                if (1..=10).contains(&value) {
                    config.execution_max_attempts = value;
                }
            }
        }

        if let Ok(timeout) = std::env::var("CONFIRMATION_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (5_000..=120_000).contains(&value) {
                    config.confirmation_timeout_ms = value;
                }
            }
        }

        if let Ok(bucket) = std::env::var("IDEMPOTENCY_BUCKET_SECONDS") {
            if let Ok(value) = bucket.parse::<i64>() {
                if (30..=3600).contains(&value) {
                    config.idempotency_bucket_seconds = value;
                }
            }
        }

        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.database_url = database_url;
        }

        if let Ok(port) = std::env::var("STATUS_PORT") {
            if let Ok(value) = port.parse::<u16>() {
                config.status_port = value;
            }
        }

        config
    }

    /// Validate cross-field invariants that cannot fall back to defaults.
    /// Rejected configuration is fatal before the loop starts.
    pub fn risk_thresholds(&self) -> Result<RiskThresholds, ConfigError> {
        RiskThresholds::new(
            self.warn_threshold,
            self.critical_threshold,
            self.emergency_threshold,
        )
    }

    pub fn strategy_targets(&self) -> Result<StrategyTargets, ConfigError> {
        StrategyTargets::new(self.repay_target_hf, self.topup_target_hf)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.risk_thresholds().is_ok());
        assert!(config.strategy_targets().is_ok());
        assert_eq!(config.min_confidence_threshold, 0.7);
        assert_eq!(config.max_concurrent_fetches, 8);
    }

    #[test]
    fn test_invalid_threshold_ordering_rejected() {
        let config = AppConfig {
            warn_threshold: 1.1,
            critical_threshold: 1.2,
            ..AppConfig::default()
        };
        assert!(config.risk_thresholds().is_err());
    }

    #[test]
    fn test_invalid_target_rejected() {
        let config = AppConfig {
            repay_target_hf: 0.9,
            ..AppConfig::default()
        };
        assert!(config.strategy_targets().is_err());
    }

    #[test]
    fn test_timeout_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.cycle_timeout(), Duration::from_secs(120));
    }
}
