use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding a raw on-chain account buffer.
///
/// A decode failure only ever skips the affected account for the current
/// monitoring cycle; it is never allowed to abort the cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short: {actual} bytes, need at least {required}")]
    Truncated { required: usize, actual: usize },

    #[error("malformed account data: {0}")]
    Malformed(String),

    #[error("unsupported account layout version: {0}")]
    UnsupportedVersion(String),
}

/// Errors from the external advisory collaborator.
///
/// Advisory failures always degrade to the deterministic baseline; they are
/// logged but never escalated past the strategy engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("advisory service unavailable: {0}")]
    Unavailable(String),

    #[error("advisory payload invalid: {0}")]
    InvalidPayload(String),
}

/// Classified execution failures.
///
/// `TransientNetwork` and `Timeout` are retryable with backoff; every other
/// class is terminal for the decision that triggered it.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", content = "detail", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid execution parameters: {0}")]
    InvalidParameters(String),

    #[error("transaction reverted on chain: {0}")]
    Reverted(String),
}

impl ExecutionError {
    /// Whether the coordinator may retry this failure class.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::TransientNetwork(_) | ExecutionError::Timeout(_)
        )
    }
}

/// Errors from the hash-chained activity ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger integrity violation at sequence {sequence}: {detail}")]
    IntegrityViolation { sequence: u64, detail: String },

    #[error("ledger persistence failure: {0}")]
    PersistenceFailure(String),
}

/// Errors from the chain RPC collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc transport failure: {0}")]
    Transport(String),

    #[error("rpc protocol error: {0}")]
    Protocol(String),

    #[error("rpc request timed out")]
    Timeout,
}

/// Startup configuration errors. Always fatal before the loop starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid risk thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid rebalance target: {0}")]
    InvalidTarget(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_retryable_classes() {
        assert!(ExecutionError::TransientNetwork("reset".into()).is_retryable());
        assert!(ExecutionError::Timeout("30s".into()).is_retryable());
        assert!(!ExecutionError::InsufficientFunds("0.1 SOL".into()).is_retryable());
        assert!(!ExecutionError::InvalidParameters("bad mint".into()).is_retryable());
        assert!(!ExecutionError::Reverted("slippage".into()).is_retryable());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Truncated {
            required: 140,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "buffer too short: 12 bytes, need at least 140"
        );
    }

    #[test]
    fn test_execution_error_serde_tagging() {
        let err = ExecutionError::Reverted("custom program error".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["class"], "reverted");
    }
}
