//! Execution Collaborator Traits
//!
//! The three external legs of a rebalance: a swap quoter (DEX aggregator),
//! an instruction builder (protocol transaction assembly), and a
//! signer/broadcaster (external custody; this engine never holds keys).
//! Each is an async capability returning success/failure plus opaque
//! references, which keeps the coordinator's idempotency and retry logic
//! testable against counting mocks.

use crate::domain::entities::decision::StrategyDecision;
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::errors::ExecutionError;
use async_trait::async_trait;

/// A priced swap route from the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_usd: f64,
    /// Opaque route handle passed back when building the transaction.
    pub route_ref: String,
}

/// A fully assembled, unsigned transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTransaction {
    /// Base64 serialized transaction payload.
    pub payload_b64: String,
}

/// On-chain lifecycle of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Seen by the cluster but not yet confirmed. Not success.
    Processed,
    Confirmed,
    Finalized,
    /// Landed on chain and failed.
    Failed,
}

impl ConfirmationStatus {
    /// Broadcast acceptance is not success; only cluster confirmation is.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized
        )
    }
}

#[async_trait]
pub trait SwapQuoter: Send + Sync {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_usd: f64,
    ) -> Result<SwapQuote, ExecutionError>;
}

#[async_trait]
pub trait InstructionBuilder: Send + Sync {
    /// Assemble the transaction realizing `decision` against `position`.
    /// `quote` is present for the strategies that route through a swap.
    async fn build(
        &self,
        position: &CanonicalPosition,
        decision: &StrategyDecision,
        quote: Option<&SwapQuote>,
    ) -> Result<BuiltTransaction, ExecutionError>;
}

#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    /// Hand the transaction to the external signer and broadcast it.
    /// Returns the opaque transaction reference (signature).
    async fn broadcast(&self, tx: &BuiltTransaction) -> Result<String, ExecutionError>;

    /// Poll the current confirmation status of a broadcast transaction.
    async fn confirmation_status(
        &self,
        tx_reference: &str,
    ) -> Result<ConfirmationStatus, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_gate() {
        assert!(!ConfirmationStatus::Processed.is_confirmed());
        assert!(ConfirmationStatus::Confirmed.is_confirmed());
        assert!(ConfirmationStatus::Finalized.is_confirmed());
        assert!(!ConfirmationStatus::Failed.is_confirmed());
    }
}
