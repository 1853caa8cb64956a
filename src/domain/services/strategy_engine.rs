//! Strategy selection: deterministic baseline plus bounded advisory input.
//!
//! The engine always produces a decision. The deterministic baseline is a
//! pure function of the position and its risk level; an advisory, when one
//! arrives, is validated structurally and may override strategy and amount
//! but never the derived risk level. Anything invalid degrades silently to
//! the baseline; advisory failure is an expected condition, not an error.

use crate::domain::entities::decision::{Advisory, RebalanceStrategy, StrategyDecision};
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::entities::risk::RiskLevel;
use crate::domain::errors::{AdvisoryError, ConfigError};
use crate::domain::value_objects::usd_amount::UsdAmount;
use chrono::Utc;
use tracing::warn;

/// Health-factor targets the closed-form amount solves aim for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyTargets {
    /// Target health after a debt repayment.
    pub repay_target_hf: f64,
    /// Target health after a collateral top-up.
    pub topup_target_hf: f64,
}

impl StrategyTargets {
    pub fn new(repay_target_hf: f64, topup_target_hf: f64) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("repay_target_hf", repay_target_hf),
            ("topup_target_hf", topup_target_hf),
        ] {
            if !value.is_finite() || !(1.1..=5.0).contains(&value) {
                return Err(ConfigError::InvalidTarget(format!(
                    "{} must be within [1.1, 5.0], got {}",
                    name, value
                )));
            }
        }
        Ok(StrategyTargets {
            repay_target_hf,
            topup_target_hf,
        })
    }
}

impl Default for StrategyTargets {
    fn default() -> Self {
        StrategyTargets {
            repay_target_hf: 1.5,
            topup_target_hf: 2.0,
        }
    }
}

/// How the advisory influenced a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryStatus {
    /// Valid advisory applied over the baseline.
    Applied,
    /// No advisory was offered.
    Absent,
    /// Advisory present but rejected; baseline used.
    Degraded { reason: String },
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: StrategyDecision,
    pub advisory: AdvisoryStatus,
}

/// Confidence assigned to baseline decisions. Conservative on purpose: the
/// baseline is rule-derived, not advised.
const BASELINE_CONFIDENCE: f64 = 0.9;

pub struct StrategyEngine {
    targets: StrategyTargets,
}

impl StrategyEngine {
    pub fn new(targets: StrategyTargets) -> Self {
        StrategyEngine { targets }
    }

    /// Produce a decision for the position at the given risk level.
    ///
    /// A `Healthy` position always decides `NoAction` with urgency 0; the
    /// advisory is not consulted for it.
    pub fn decide(
        &self,
        position: &CanonicalPosition,
        risk_level: RiskLevel,
        advisory: Option<&Advisory>,
    ) -> DecisionOutcome {
        if risk_level == RiskLevel::Healthy {
            return DecisionOutcome {
                decision: self.baseline_decision(position, risk_level),
                advisory: AdvisoryStatus::Absent,
            };
        }

        match advisory {
            None => DecisionOutcome {
                decision: self.baseline_decision(position, risk_level),
                advisory: AdvisoryStatus::Absent,
            },
            Some(adv) => match Self::validate_advisory(adv) {
                Ok((strategy, amount)) => DecisionOutcome {
                    decision: self.advised_decision(position, risk_level, adv, strategy, amount),
                    advisory: AdvisoryStatus::Applied,
                },
                Err(err) => {
                    warn!(
                        position_key = %position.position_key,
                        error = %err,
                        "advisory rejected, using deterministic baseline"
                    );
                    DecisionOutcome {
                        decision: self.baseline_decision(position, risk_level),
                        advisory: AdvisoryStatus::Degraded {
                            reason: err.to_string(),
                        },
                    }
                }
            },
        }
    }

    /// Structural validation of the untrusted advisory.
    fn validate_advisory(adv: &Advisory) -> Result<(RebalanceStrategy, f64), AdvisoryError> {
        let strategy: RebalanceStrategy = adv
            .strategy
            .parse()
            .map_err(AdvisoryError::InvalidPayload)?;
        if !adv.suggested_amount_usd.is_finite() || adv.suggested_amount_usd < 0.0 {
            return Err(AdvisoryError::InvalidPayload(format!(
                "amount {} not a finite non-negative number",
                adv.suggested_amount_usd
            )));
        }
        for (name, value) in [("urgency", adv.urgency), ("confidence", adv.confidence)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AdvisoryError::InvalidPayload(format!(
                    "{} {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if strategy != RebalanceStrategy::NoAction && adv.suggested_amount_usd <= 0.0 {
            return Err(AdvisoryError::InvalidPayload(format!(
                "strategy {} requires a positive amount",
                strategy
            )));
        }
        Ok((strategy, adv.suggested_amount_usd))
    }

    fn advised_decision(
        &self,
        position: &CanonicalPosition,
        risk_level: RiskLevel,
        adv: &Advisory,
        strategy: RebalanceStrategy,
        amount: f64,
    ) -> StrategyDecision {
        // Urgency stays monotone in danger even when advised.
        let urgency = adv.urgency.max(urgency_floor(risk_level));
        let amount = if strategy == RebalanceStrategy::NoAction {
            0.0
        } else {
            amount
        };
        build_decision(
            position,
            risk_level,
            strategy,
            amount,
            urgency,
            adv.confidence,
            adv.reasoning.clone(),
        )
    }

    fn baseline_decision(
        &self,
        position: &CanonicalPosition,
        risk_level: RiskLevel,
    ) -> StrategyDecision {
        let hf = position.health_factor;
        let collateral = position.total_collateral_usd;
        let debt = position.total_debt_usd;
        let threshold = position.liquidation_threshold;

        let (strategy, amount, urgency, reasoning) = match risk_level {
            RiskLevel::Healthy => (
                RebalanceStrategy::NoAction,
                0.0,
                0.0,
                format!(
                    "Position healthy. Health factor {:.4} above warning threshold.",
                    hf
                ),
            ),
            RiskLevel::Warning => {
                let target = self.targets.topup_target_hf;
                let amount = if threshold > 0.0 {
                    (debt * target / threshold - collateral).max(0.0)
                } else {
                    debt
                };
                (
                    RebalanceStrategy::CollateralTopUp,
                    amount,
                    0.4,
                    format!(
                        "WARNING: health factor {:.4}. Adding {:.2} USD collateral to reach health {:.2}.",
                        hf, amount, target
                    ),
                )
            }
            RiskLevel::Critical => {
                let target = self.targets.repay_target_hf;
                let amount = (debt - collateral * threshold / target).max(0.0);
                (
                    RebalanceStrategy::DebtRepayment,
                    amount,
                    0.8,
                    format!(
                        "CRITICAL: health factor {:.4}. Repaying {:.2} USD to restore health to {:.2}.",
                        hf, amount, target
                    ),
                )
            }
            RiskLevel::Emergency => {
                let target = self.targets.repay_target_hf;
                let amount = (debt - collateral * threshold / target).max(0.0);
                (
                    RebalanceStrategy::DebtRepayment,
                    amount,
                    0.95,
                    format!(
                        "EMERGENCY: health factor {:.4}. Repaying {:.2} USD immediately to restore health to {:.2}.",
                        hf, amount, target
                    ),
                )
            }
            RiskLevel::Liquidated => (
                RebalanceStrategy::EmergencyUnwind,
                debt,
                1.0,
                format!(
                    "LIQUIDATION-ELIGIBLE: health factor {:.4}. Unwinding {:.2} USD of debt.",
                    hf, debt
                ),
            ),
        };

        build_decision(
            position,
            risk_level,
            strategy,
            amount,
            urgency,
            BASELINE_CONFIDENCE,
            reasoning,
        )
    }
}

fn urgency_floor(risk_level: RiskLevel) -> f64 {
    match risk_level {
        RiskLevel::Healthy => 0.0,
        RiskLevel::Warning => 0.2,
        RiskLevel::Critical => 0.6,
        RiskLevel::Emergency | RiskLevel::Liquidated => 0.9,
    }
}

fn build_decision(
    position: &CanonicalPosition,
    risk_level: RiskLevel,
    strategy: RebalanceStrategy,
    amount: f64,
    urgency: f64,
    confidence: f64,
    reasoning: String,
) -> StrategyDecision {
    let suggested_amount_usd = match UsdAmount::new(amount) {
        Ok(amount) => amount,
        Err(err) => {
            warn!(amount, error = %err, "clamping invalid decision amount to zero");
            UsdAmount::zero()
        }
    };
    let reasoning_hash = StrategyDecision::hash_reasoning(&reasoning);
    StrategyDecision {
        position_key: position.position_key.clone(),
        risk_level,
        strategy,
        suggested_amount_usd,
        urgency,
        confidence,
        reasoning,
        reasoning_hash,
        decided_at: Utc::now(),
    }
}
