//! Pure, total risk classification over health factors.

use crate::domain::entities::risk::{RiskLevel, RiskThresholds};

/// Classify a health factor into a risk band.
///
/// Total over every `f64`: the HEALTHY sentinel (`+∞`) maps to `Healthy`,
/// and non-finite or non-positive garbage maps to `Liquidated` so a
/// corrupted input can only ever err toward action, not away from it.
///
/// Band comparisons: `hf <= 1.0` is liquidation-eligible; above that,
/// strict `<` against each threshold, so a health factor sitting exactly on
/// `warn`/`critical`/`emergency` lands in the lower-danger band.
pub fn classify(health_factor: f64, thresholds: &RiskThresholds) -> RiskLevel {
    if health_factor.is_nan() {
        return RiskLevel::Liquidated;
    }
    if health_factor == f64::INFINITY {
        return RiskLevel::Healthy;
    }
    if health_factor <= 1.0 {
        return RiskLevel::Liquidated;
    }
    if health_factor < thresholds.emergency {
        RiskLevel::Emergency
    } else if health_factor < thresholds.critical {
        RiskLevel::Critical
    } else if health_factor < thresholds.warn {
        RiskLevel::Warning
    } else {
        RiskLevel::Healthy
    }
}
