//! Strategy decisions and execution outcomes.

use crate::domain::entities::risk::RiskLevel;
use crate::domain::errors::ExecutionError;
use crate::domain::value_objects::usd_amount::UsdAmount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Rebalancing strategies the engine can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    NoAction,
    CollateralTopUp,
    DebtRepayment,
    CollateralSwap,
    PositionMigration,
    EmergencyUnwind,
}

impl RebalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceStrategy::NoAction => "no_action",
            RebalanceStrategy::CollateralTopUp => "collateral_top_up",
            RebalanceStrategy::DebtRepayment => "debt_repayment",
            RebalanceStrategy::CollateralSwap => "collateral_swap",
            RebalanceStrategy::PositionMigration => "position_migration",
            RebalanceStrategy::EmergencyUnwind => "emergency_unwind",
        }
    }
}

impl std::str::FromStr for RebalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_action" => Ok(RebalanceStrategy::NoAction),
            "collateral_top_up" => Ok(RebalanceStrategy::CollateralTopUp),
            "debt_repayment" => Ok(RebalanceStrategy::DebtRepayment),
            "collateral_swap" => Ok(RebalanceStrategy::CollateralSwap),
            "position_migration" => Ok(RebalanceStrategy::PositionMigration),
            "emergency_unwind" => Ok(RebalanceStrategy::EmergencyUnwind),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

impl std::fmt::Display for RebalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Untrusted external suggestion. Everything here is validated by the
/// strategy engine before any field is allowed to influence a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Raw strategy label; parsed against `RebalanceStrategy`.
    pub strategy: String,
    pub suggested_amount_usd: f64,
    pub urgency: f64,
    pub confidence: f64,
    pub reasoning: String,
}

/// Immutable rebalancing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub position_key: String,
    pub risk_level: RiskLevel,
    pub strategy: RebalanceStrategy,
    /// Invariant: `strategy != NoAction` implies a positive amount.
    pub suggested_amount_usd: UsdAmount,
    /// 0 = no rush, 1 = act immediately.
    pub urgency: f64,
    pub confidence: f64,
    pub reasoning: String,
    /// SHA-256 of the reasoning text, for attestation.
    pub reasoning_hash: String,
    pub decided_at: DateTime<Utc>,
}

impl StrategyDecision {
    pub fn needs_action(&self) -> bool {
        self.strategy != RebalanceStrategy::NoAction
    }

    /// SHA-256 hex digest of a reasoning string.
    pub fn hash_reasoning(reasoning: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(reasoning.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Ledger payload for this decision.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "position_key": self.position_key,
            "risk_level": self.risk_level,
            "strategy": self.strategy,
            "suggested_amount_usd": self.suggested_amount_usd,
            "urgency": self.urgency,
            "confidence": self.confidence,
            "reasoning": self.reasoning,
            "reasoning_hash": self.reasoning_hash,
        })
    }
}

/// Outcome of one execution request, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub position_key: String,
    pub strategy: RebalanceStrategy,
    pub success: bool,
    /// Opaque transaction reference from the broadcaster; absent for
    /// short-circuits, coalesced skips, and pre-broadcast failures.
    pub tx_reference: Option<String>,
    pub realized_amount_usd: UsdAmount,
    pub error: Option<ExecutionError>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "position_key": self.position_key,
            "strategy": self.strategy,
            "success": self.success,
            "tx_reference": self.tx_reference,
            "realized_amount_usd": self.realized_amount_usd,
            "error": self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for s in [
            RebalanceStrategy::NoAction,
            RebalanceStrategy::CollateralTopUp,
            RebalanceStrategy::DebtRepayment,
            RebalanceStrategy::CollateralSwap,
            RebalanceStrategy::PositionMigration,
            RebalanceStrategy::EmergencyUnwind,
        ] {
            let parsed: RebalanceStrategy = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("flash_loan".parse::<RebalanceStrategy>().is_err());
    }

    #[test]
    fn test_reasoning_hash_is_stable() {
        let a = StrategyDecision::hash_reasoning("repay 966.67 USD");
        let b = StrategyDecision::hash_reasoning("repay 966.67 USD");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, StrategyDecision::hash_reasoning("repay 966.68 USD"));
    }

    #[test]
    fn test_strategy_serde_snake_case() {
        let json = serde_json::to_string(&RebalanceStrategy::EmergencyUnwind).unwrap();
        assert_eq!(json, "\"emergency_unwind\"");
    }
}
