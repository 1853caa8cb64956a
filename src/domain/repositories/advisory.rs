//! Advisory Client Trait
//!
//! The advisory service is an untrusted oracle: whatever it returns is
//! validated structurally by the strategy engine before any field can
//! influence a decision, and every failure degrades to the deterministic
//! baseline. Injecting it as a trait keeps the decision engine fully
//! testable offline.

use crate::domain::entities::decision::Advisory;
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::entities::risk::RiskLevel;
use crate::domain::errors::AdvisoryError;
use async_trait::async_trait;

#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// Request a rebalancing suggestion for an at-risk position.
    ///
    /// Implementations must enforce their own timeout; a hung advisory call
    /// may never stall the cycle.
    async fn suggest(
        &self,
        position: &CanonicalPosition,
        risk_level: RiskLevel,
    ) -> Result<Advisory, AdvisoryError>;
}
