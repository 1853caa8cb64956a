//! Canonical position model shared by every protocol decoder.
//!
//! A `CanonicalPosition` is recreated wholesale each monitoring cycle and
//! replaced in the repository, never mutated in place, so readers can never
//! observe a half-updated snapshot.

use crate::domain::entities::protocol::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One collateral asset inside a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralLeg {
    /// Mint or reserve address identifying the asset.
    pub asset: String,
    /// Quantity in native units of the asset.
    pub amount: f64,
    pub usd_value: f64,
    /// Loan-to-value fraction applied when borrowing against this asset.
    pub ltv: f64,
    /// Fraction of this asset's value counted toward the health numerator.
    pub liquidation_threshold: f64,
}

/// One borrowed asset inside a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtLeg {
    pub asset: String,
    pub amount: f64,
    pub usd_value: f64,
    /// Annualized borrow rate as a fraction (0.05 = 5% APY).
    pub borrow_rate: f64,
}

/// Unified lending position across protocols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPosition {
    pub protocol: Protocol,
    pub owner: String,
    /// Address of the on-chain obligation/margin account; unique per
    /// protocol + account.
    pub position_key: String,
    pub collateral: Vec<CollateralLeg>,
    pub debt: Vec<DebtLeg>,
    pub total_collateral_usd: f64,
    pub total_debt_usd: f64,
    pub health_factor: f64,
    /// Value-weighted liquidation threshold across collateral legs.
    pub liquidation_threshold: f64,
    pub last_observed_at: DateTime<Utc>,
}

/// Canonical health-factor formula, shared by all protocol decoders so
/// classification behaves identically regardless of origin.
///
/// `debt <= 0` yields the HEALTHY sentinel (`+∞`): a position with no debt
/// cannot be liquidated no matter its collateral.
pub fn health_factor(total_collateral_usd: f64, liquidation_threshold: f64, total_debt_usd: f64) -> f64 {
    if total_debt_usd <= 0.0 {
        f64::INFINITY
    } else {
        total_collateral_usd * liquidation_threshold / total_debt_usd
    }
}

impl CanonicalPosition {
    /// Assemble a position, computing the health factor from the canonical
    /// formula. Totals must already be non-negative (decoders read them from
    /// unsigned fields).
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        protocol: Protocol,
        owner: String,
        position_key: String,
        collateral: Vec<CollateralLeg>,
        debt: Vec<DebtLeg>,
        total_collateral_usd: f64,
        total_debt_usd: f64,
        liquidation_threshold: f64,
    ) -> Self {
        let hf = health_factor(total_collateral_usd, liquidation_threshold, total_debt_usd);
        CanonicalPosition {
            protocol,
            owner,
            position_key,
            collateral,
            debt,
            total_collateral_usd,
            total_debt_usd,
            health_factor: hf,
            liquidation_threshold,
            last_observed_at: Utc::now(),
        }
    }

    /// How much more could be borrowed before the position becomes
    /// liquidation-eligible.
    pub fn available_borrow_usd(&self) -> f64 {
        if self.liquidation_threshold <= 0.0 {
            return 0.0;
        }
        let max_debt = self.total_collateral_usd * self.liquidation_threshold;
        (max_debt - self.total_debt_usd).max(0.0)
    }

    /// Percentage drop in collateral value that would trigger liquidation.
    pub fn distance_to_liquidation_pct(&self) -> f64 {
        if self.total_collateral_usd <= 0.0 || self.total_debt_usd <= 0.0 {
            return 100.0;
        }
        if self.liquidation_threshold <= 0.0 {
            return 0.0;
        }
        let liq_value = self.total_debt_usd / self.liquidation_threshold;
        ((self.total_collateral_usd - liq_value) / self.total_collateral_usd * 100.0).max(0.0)
    }

    /// Compact JSON summary used for ledger payloads and advisory requests.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "protocol": self.protocol,
            "owner": self.owner,
            "position_key": self.position_key,
            "total_collateral_usd": self.total_collateral_usd,
            "total_debt_usd": self.total_debt_usd,
            "health_factor": if self.health_factor.is_finite() {
                serde_json::json!(self.health_factor)
            } else {
                serde_json::json!("infinity")
            },
            "liquidation_threshold": self.liquidation_threshold,
            "collateral_legs": self.collateral.len(),
            "debt_legs": self.debt.len(),
        })
    }
}
