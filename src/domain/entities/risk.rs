//! Risk levels and the configured thresholds that separate them.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Position risk classification, totally ordered from safest to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Healthy,
    Warning,
    Critical,
    Emergency,
    Liquidated,
}

impl RiskLevel {
    /// Warning or worse: the monitoring loop engages the strategy engine.
    pub fn is_at_risk(&self) -> bool {
        *self >= RiskLevel::Warning
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Healthy => write!(f, "HEALTHY"),
            RiskLevel::Warning => write!(f, "WARNING"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
            RiskLevel::Emergency => write!(f, "EMERGENCY"),
            RiskLevel::Liquidated => write!(f, "LIQUIDATED"),
        }
    }
}

/// Health-factor thresholds separating the risk bands.
///
/// Invariant, checked at construction: `warn > critical > emergency > 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub warn: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl RiskThresholds {
    pub fn new(warn: f64, critical: f64, emergency: f64) -> Result<Self, ConfigError> {
        if !(warn.is_finite() && critical.is_finite() && emergency.is_finite()) {
            return Err(ConfigError::InvalidThresholds(
                "thresholds must be finite".to_string(),
            ));
        }
        if !(warn > critical && critical > emergency && emergency > 1.0) {
            return Err(ConfigError::InvalidThresholds(format!(
                "require warn > critical > emergency > 1.0, got {} / {} / {}",
                warn, critical, emergency
            )));
        }
        Ok(RiskThresholds {
            warn,
            critical,
            emergency,
        })
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        RiskThresholds {
            warn: 1.5,
            critical: 1.2,
            emergency: 1.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Healthy < RiskLevel::Warning);
        assert!(RiskLevel::Warning < RiskLevel::Critical);
        assert!(RiskLevel::Critical < RiskLevel::Emergency);
        assert!(RiskLevel::Emergency < RiskLevel::Liquidated);
    }

    #[test]
    fn test_at_risk_boundary() {
        assert!(!RiskLevel::Healthy.is_at_risk());
        assert!(RiskLevel::Warning.is_at_risk());
        assert!(RiskLevel::Liquidated.is_at_risk());
    }

    #[test]
    fn test_thresholds_valid() {
        let t = RiskThresholds::new(1.5, 1.2, 1.05).unwrap();
        assert_eq!(t.warn, 1.5);
    }

    #[test]
    fn test_thresholds_rejects_bad_ordering() {
        assert!(RiskThresholds::new(1.2, 1.5, 1.05).is_err());
        assert!(RiskThresholds::new(1.5, 1.2, 1.0).is_err());
        assert!(RiskThresholds::new(1.5, 1.5, 1.05).is_err());
        assert!(RiskThresholds::new(f64::NAN, 1.2, 1.05).is_err());
        assert!(RiskThresholds::new(f64::INFINITY, 1.2, 1.05).is_err());
    }

    #[test]
    fn test_default_thresholds_are_valid() {
        let d = RiskThresholds::default();
        assert!(RiskThresholds::new(d.warn, d.critical, d.emergency).is_ok());
    }
}
