//! ExecutionCoordinator - turns decisions into confirmed on-chain actions.
//!
//! Execution mistakes are financially irreversible, so the coordinator is
//! deliberately strict: at most one execution in flight per position, an
//! idempotency key over `(position_key, decision time bucket)` so repeated
//! decisions coalesce instead of double-executing, bounded retries for
//! transient failures only, and success only on explicit on-chain
//! confirmation; broadcast acceptance alone never counts. Every attempt,
//! skip, and outcome is appended to the activity ledger.

use crate::domain::entities::decision::{ExecutionResult, RebalanceStrategy, StrategyDecision};
use crate::domain::entities::position::CanonicalPosition;
use crate::domain::errors::{ExecutionError, LedgerError};
use crate::domain::repositories::execution::{
    InstructionBuilder, SwapQuote, SwapQuoter, TransactionBroadcaster,
};
use crate::domain::services::activity_ledger::ActivityLedger;
use crate::domain::value_objects::usd_amount::UsdAmount;
use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Wrapped SOL and USDC mints, the default swap legs.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Total attempts for transient failure classes.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long to wait for on-chain confirmation before the attempt is a
    /// timeout failure.
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
    /// Width of the idempotency time bucket.
    pub idempotency_bucket_secs: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            confirmation_timeout: Duration::from_secs(30),
            confirmation_poll_interval: Duration::from_secs(2),
            idempotency_bucket_secs: 300,
        }
    }
}

struct IdempotencyState {
    /// Position keys with an execution currently in flight.
    in_flight: HashSet<String>,
    /// Idempotency keys already executed, by bucket (for pruning).
    completed: HashMap<String, i64>,
}

pub struct ExecutionCoordinator {
    quoter: Arc<dyn SwapQuoter>,
    builder: Arc<dyn InstructionBuilder>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    ledger: Arc<ActivityLedger>,
    config: ExecutionConfig,
    idempotency: Mutex<IdempotencyState>,
}

impl ExecutionCoordinator {
    pub fn new(
        quoter: Arc<dyn SwapQuoter>,
        builder: Arc<dyn InstructionBuilder>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        ledger: Arc<ActivityLedger>,
        config: ExecutionConfig,
    ) -> Self {
        ExecutionCoordinator {
            quoter,
            builder,
            broadcaster,
            ledger,
            config,
            idempotency: Mutex::new(IdempotencyState {
                in_flight: HashSet::new(),
                completed: HashMap::new(),
            }),
        }
    }

    /// Execute a decision. The only hard error is a ledger append failure;
    /// every execution failure is reported inside the `ExecutionResult`.
    pub async fn execute(
        &self,
        position: &CanonicalPosition,
        decision: &StrategyDecision,
    ) -> Result<ExecutionResult, LedgerError> {
        if !decision.needs_action() {
            let result = ExecutionResult {
                position_key: decision.position_key.clone(),
                strategy: decision.strategy,
                success: true,
                tx_reference: None,
                realized_amount_usd: UsdAmount::zero(),
                error: None,
                executed_at: Utc::now(),
            };
            self.ledger
                .log("execution_noop", result.to_payload())
                .await?;
            return Ok(result);
        }

        let bucket = decision.decided_at.timestamp() / self.config.idempotency_bucket_secs;
        let idempotency_key = format!("{}:{}", decision.position_key, bucket);

        {
            let mut state = self.idempotency.lock().await;
            let pending = state.in_flight.contains(&decision.position_key);
            let already_done = state.completed.contains_key(&idempotency_key);
            if pending || already_done {
                drop(state);
                let result = ExecutionResult {
                    position_key: decision.position_key.clone(),
                    strategy: decision.strategy,
                    success: true,
                    tx_reference: None,
                    realized_amount_usd: UsdAmount::zero(),
                    error: None,
                    executed_at: Utc::now(),
                };
                info!(
                    position_key = %decision.position_key,
                    pending,
                    "coalescing duplicate execution request"
                );
                self.ledger
                    .log("execution_coalesced", result.to_payload())
                    .await?;
                return Ok(result);
            }
            state.in_flight.insert(decision.position_key.clone());
        }

        let outcome = self.execute_with_retries(position, decision).await?;

        {
            let mut state = self.idempotency.lock().await;
            state.in_flight.remove(&decision.position_key);
            if outcome.success {
                state.completed.insert(idempotency_key, bucket);
                // Keep only recent buckets; older keys can never recur.
                state.completed.retain(|_, b| *b >= bucket - 2);
            }
        }

        self.ledger
            .log("execution_result", outcome.to_payload())
            .await?;
        Ok(outcome)
    }

    async fn execute_with_retries(
        &self,
        position: &CanonicalPosition,
        decision: &StrategyDecision,
    ) -> Result<ExecutionResult, LedgerError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1u32;

        loop {
            match self.run_pipeline(position, decision).await {
                Ok(tx_reference) => {
                    info!(
                        position_key = %decision.position_key,
                        strategy = %decision.strategy,
                        tx = %tx_reference,
                        "rebalance confirmed on chain"
                    );
                    return Ok(ExecutionResult {
                        position_key: decision.position_key.clone(),
                        strategy: decision.strategy,
                        success: true,
                        tx_reference: Some(tx_reference),
                        realized_amount_usd: decision.suggested_amount_usd,
                        error: None,
                        executed_at: Utc::now(),
                    });
                }
                Err(err) => {
                    let retryable = err.is_retryable() && attempt < self.config.max_attempts;
                    warn!(
                        position_key = %decision.position_key,
                        attempt,
                        error = %err,
                        retryable,
                        "execution attempt failed"
                    );
                    self.ledger
                        .log(
                            "execution_attempt_failed",
                            serde_json::json!({
                                "position_key": decision.position_key,
                                "strategy": decision.strategy,
                                "attempt": attempt,
                                "error": err.clone(),
                                "will_retry": retryable,
                            }),
                        )
                        .await?;

                    if !retryable {
                        return Ok(ExecutionResult {
                            position_key: decision.position_key.clone(),
                            strategy: decision.strategy,
                            success: false,
                            tx_reference: None,
                            realized_amount_usd: UsdAmount::zero(),
                            error: Some(err),
                            executed_at: Utc::now(),
                        });
                    }

                    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
                    tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// One full attempt: quote (when the strategy routes through a swap),
    /// build, broadcast, and wait for confirmation.
    async fn run_pipeline(
        &self,
        position: &CanonicalPosition,
        decision: &StrategyDecision,
    ) -> Result<String, ExecutionError> {
        let amount = decision.suggested_amount_usd.value();
        let quote = match decision.strategy {
            RebalanceStrategy::CollateralTopUp => Some(
                self.quoter
                    .quote(USDC_MINT, &primary_collateral_asset(position), amount)
                    .await?,
            ),
            RebalanceStrategy::CollateralSwap => Some(
                self.quoter
                    .quote(&primary_collateral_asset(position), USDC_MINT, amount)
                    .await?,
            ),
            // Repayment, unwind, and migration build protocol instructions
            // directly without routing a swap first.
            _ => None,
        };

        let tx = self.builder.build(position, decision, quote.as_ref()).await?;
        let tx_reference = self.broadcaster.broadcast(&tx).await?;
        self.await_confirmation(&tx_reference).await?;
        Ok(tx_reference)
    }

    async fn await_confirmation(&self, tx_reference: &str) -> Result<(), ExecutionError> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;
        loop {
            let status = self.broadcaster.confirmation_status(tx_reference).await?;
            if status.is_confirmed() {
                return Ok(());
            }
            if status == crate::domain::repositories::execution::ConfirmationStatus::Failed {
                return Err(ExecutionError::Reverted(format!(
                    "transaction {} failed on chain",
                    tx_reference
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecutionError::Timeout(format!(
                    "transaction {} not confirmed within {:?}",
                    tx_reference, self.config.confirmation_timeout
                )));
            }
            tokio::time::sleep(self.config.confirmation_poll_interval).await;
        }
    }
}

/// Largest collateral leg's asset, the default counter-leg for swaps.
fn primary_collateral_asset(position: &CanonicalPosition) -> String {
    position
        .collateral
        .iter()
        .max_by(|a, b| {
            a.usd_value
                .partial_cmp(&b.usd_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|leg| leg.asset.clone())
        .unwrap_or_else(|| SOL_MINT.to_string())
}
