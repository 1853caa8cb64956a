//! MonitorService - the fetch → decode → classify → decide → execute → log
//! cycle across watched owners.
//!
//! Fetches for all (owner, protocol) pairs run concurrently under bounded
//! parallelism and the fan-out is joined before classification, which is
//! CPU-only. One fetch or decode failure is isolated to its pair and never
//! aborts the cycle for anyone else. Per position the ordering is strict:
//! decode → classify → decide → execute → log; across positions there is no
//! ordering at all.
//!
//! The only hard error a cycle can raise is a ledger append failure: a
//! decision that cannot be recorded must not happen silently.

use crate::domain::entities::position::CanonicalPosition;
use crate::domain::entities::risk::RiskThresholds;
use crate::domain::errors::{LedgerError, RpcError};
use crate::domain::repositories::advisory::AdvisoryClient;
use crate::domain::repositories::chain_rpc::{ChainRpc, RawAccount};
use crate::domain::services::activity_ledger::ActivityLedger;
use crate::domain::services::decoders::AccountDecoder;
use crate::domain::services::execution_coordinator::ExecutionCoordinator;
use crate::domain::services::position_repository::PositionRepository;
use crate::domain::services::risk_classifier::classify;
use crate::domain::services::strategy_engine::{AdvisoryStatus, StrategyEngine};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub watched_owners: Vec<String>,
    pub thresholds: RiskThresholds,
    /// Minimum decision confidence before execution is attempted.
    pub min_confidence: f64,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub cycle_timeout: Duration,
}

/// Outcome of one monitoring cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub positions_seen: usize,
    pub at_risk: usize,
    pub decisions_made: usize,
    pub executions: usize,
    pub fetch_failures: usize,
    pub decode_failures: usize,
    pub amount_protected_usd: f64,
    pub duration_ms: u64,
}

/// Lifetime aggregates across cycles.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub cycles: u64,
    pub positions_monitored: u64,
    pub decisions_made: u64,
    pub rebalances_executed: u64,
    pub total_value_protected_usd: f64,
    pub started_at: DateTime<Utc>,
}

pub struct MonitorService {
    settings: MonitorSettings,
    rpc: Arc<dyn ChainRpc>,
    decoders: Vec<Arc<dyn AccountDecoder>>,
    advisory: Option<Arc<dyn AdvisoryClient>>,
    engine: StrategyEngine,
    repository: Arc<PositionRepository>,
    coordinator: Arc<ExecutionCoordinator>,
    ledger: Arc<ActivityLedger>,
    stats: Mutex<MonitorStats>,
    last_cycle: Mutex<Option<CycleSummary>>,
}

/// One bounded fetch for a single (owner, protocol) pair. Extracted to a
/// named async fn so its future carries a concrete signature; this avoids a
/// spurious higher-ranked-lifetime inference failure that appears when the
/// enclosing cycle future (which holds `Arc<dyn AccountDecoder>` across an
/// await) is spawned onto the runtime.
type FetchOutcome = (
    String,
    Arc<dyn AccountDecoder>,
    Result<Result<Vec<RawAccount>, RpcError>, tokio::time::error::Elapsed>,
);

async fn fetch_pair(
    rpc: Arc<dyn ChainRpc>,
    fetch_timeout: Duration,
    owner: String,
    decoder: Arc<dyn AccountDecoder>,
) -> FetchOutcome {
    let filters = decoder.owner_filters(&owner);
    let result = tokio::time::timeout(
        fetch_timeout,
        rpc.program_accounts(decoder.program_id(), &filters),
    )
    .await;
    (owner, decoder, result)
}

impl MonitorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: MonitorSettings,
        rpc: Arc<dyn ChainRpc>,
        decoders: Vec<Arc<dyn AccountDecoder>>,
        advisory: Option<Arc<dyn AdvisoryClient>>,
        engine: StrategyEngine,
        repository: Arc<PositionRepository>,
        coordinator: Arc<ExecutionCoordinator>,
        ledger: Arc<ActivityLedger>,
    ) -> Self {
        MonitorService {
            settings,
            rpc,
            decoders,
            advisory,
            engine,
            repository,
            coordinator,
            ledger,
            stats: Mutex::new(MonitorStats {
                cycles: 0,
                positions_monitored: 0,
                decisions_made: 0,
                rebalances_executed: 0,
                total_value_protected_usd: 0.0,
                started_at: Utc::now(),
            }),
            last_cycle: Mutex::new(None),
        }
    }

    /// Record agent startup in the ledger.
    pub async fn log_startup(&self) -> Result<(), LedgerError> {
        let protocols: Vec<&str> = self
            .decoders
            .iter()
            .map(|d| d.protocol().as_str())
            .collect();
        self.ledger
            .log(
                "agent_start",
                serde_json::json!({
                    "watched_owners": self.settings.watched_owners.len(),
                    "protocols": protocols,
                }),
            )
            .await?;
        Ok(())
    }

    /// One full cycle under the configured cycle-level timeout, with errors
    /// rendered for the supervised task runner.
    pub async fn run_bounded_cycle(&self) -> Result<(), String> {
        match tokio::time::timeout(self.settings.cycle_timeout, self.run_cycle()).await {
            Ok(Ok(summary)) => {
                info!(
                    cycle = summary.cycle,
                    positions = summary.positions_seen,
                    at_risk = summary.at_risk,
                    decisions = summary.decisions_made,
                    executions = summary.executions,
                    duration_ms = summary.duration_ms,
                    "monitoring cycle complete"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(format!("ledger failure: {}", e)),
            Err(_) => Err(format!(
                "cycle exceeded timeout {:?}",
                self.settings.cycle_timeout
            )),
        }
    }

    /// One full monitoring cycle. The cycle completes when every fetch has
    /// resolved (success or isolated failure) and every resulting decision
    /// is logged.
    pub async fn run_cycle(&self) -> Result<CycleSummary, LedgerError> {
        let started = Instant::now();
        let cycle = {
            let mut stats = self.stats.lock().await;
            stats.cycles += 1;
            stats.cycles
        };
        debug!(cycle, "monitoring cycle start");

        let mut fetch_failures = 0usize;
        let mut decode_failures = 0usize;

        // Fan out one fetch per (owner, protocol) pair, bounded, then join
        // before any classification work.
        let pairs: Vec<(String, Arc<dyn AccountDecoder>)> = self
            .settings
            .watched_owners
            .iter()
            .flat_map(|owner| {
                self.decoders
                    .iter()
                    .map(move |decoder| (owner.clone(), decoder.clone()))
            })
            .collect();

        let fetch_timeout = self.settings.fetch_timeout;
        let rpc = self.rpc.clone();
        // Build the per-pair futures eagerly over a plain iterator; they do
        // not start until `buffer_unordered` polls them, so concurrency stays
        // bounded. Keeping the `Arc<dyn AccountDecoder>` out of a stored stream
        // closure sidesteps a higher-ranked-lifetime inference failure at the
        // spawn site.
        let fetch_futures: Vec<_> = pairs
            .into_iter()
            .map(|(owner, decoder)| fetch_pair(rpc.clone(), fetch_timeout, owner, decoder))
            .collect();
        let fetched = stream::iter(fetch_futures)
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut positions: Vec<CanonicalPosition> = Vec::new();
        for (owner, decoder, result) in fetched {
            let accounts = match result {
                Err(_) => {
                    warn!(owner = %owner, protocol = %decoder.protocol(), "fetch timed out");
                    fetch_failures += 1;
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(owner = %owner, protocol = %decoder.protocol(), error = %e, "fetch failed");
                    fetch_failures += 1;
                    continue;
                }
                Ok(Ok(accounts)) => accounts,
            };

            for account in accounts {
                match decoder.decode(&account.data, &owner, &account.pubkey) {
                    Ok(Some(position)) => positions.push(position),
                    Ok(None) => {}
                    Err(e) => {
                        // Skips this account for this cycle only.
                        warn!(
                            owner = %owner,
                            protocol = %decoder.protocol(),
                            account = %account.pubkey,
                            error = %e,
                            "decode failed, skipping position"
                        );
                        decode_failures += 1;
                    }
                }
            }
        }

        let mut summary = CycleSummary {
            cycle,
            positions_seen: 0,
            at_risk: 0,
            decisions_made: 0,
            executions: 0,
            fetch_failures,
            decode_failures,
            amount_protected_usd: 0.0,
            duration_ms: 0,
        };

        for position in positions {
            let risk = classify(position.health_factor, &self.settings.thresholds);
            self.repository.replace(position.clone());
            summary.positions_seen += 1;

            if !risk.is_at_risk() {
                continue;
            }
            summary.at_risk += 1;
            warn!(
                position_key = %position.position_key,
                protocol = %position.protocol,
                health_factor = position.health_factor,
                risk = %risk,
                "position at risk"
            );

            let (advisory, client_error) = match &self.advisory {
                None => (None, None),
                Some(client) => match client.suggest(&position, risk).await {
                    Ok(advisory) => (Some(advisory), None),
                    Err(e) => (None, Some(e)),
                },
            };

            let outcome = self.engine.decide(&position, risk, advisory.as_ref());
            let degraded_reason = match (&client_error, &outcome.advisory) {
                (Some(e), _) => Some(e.to_string()),
                (None, AdvisoryStatus::Degraded { reason }) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = degraded_reason {
                self.ledger
                    .log(
                        "advisory_degraded",
                        serde_json::json!({
                            "position_key": position.position_key,
                            "reason": reason,
                        }),
                    )
                    .await?;
            }

            let decision = outcome.decision;
            self.ledger
                .log("risk_decision", decision.to_payload())
                .await?;
            summary.decisions_made += 1;

            if decision.needs_action() && decision.confidence >= self.settings.min_confidence {
                let result = self.coordinator.execute(&position, &decision).await?;
                if result.success && result.tx_reference.is_some() {
                    summary.executions += 1;
                    summary.amount_protected_usd += position.total_collateral_usd;
                }
            } else if decision.needs_action() {
                debug!(
                    position_key = %position.position_key,
                    confidence = decision.confidence,
                    "decision below confidence threshold, not executing"
                );
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock().await;
            stats.positions_monitored += summary.positions_seen as u64;
            stats.decisions_made += summary.decisions_made as u64;
            stats.rebalances_executed += summary.executions as u64;
            stats.total_value_protected_usd += summary.amount_protected_usd;
        }

        self.ledger
            .log(
                "cycle_complete",
                serde_json::to_value(&summary)
                    .map_err(|e| LedgerError::PersistenceFailure(e.to_string()))?,
            )
            .await?;

        *self.last_cycle.lock().await = Some(summary.clone());
        Ok(summary)
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.lock().await.clone()
    }

    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.lock().await.clone()
    }

    pub fn repository(&self) -> &Arc<PositionRepository> {
        &self.repository
    }

    pub fn ledger(&self) -> &Arc<ActivityLedger> {
        &self.ledger
    }

    /// Shutdown lifecycle: clear the repository's process-scoped state.
    pub fn shutdown(&self) {
        self.repository.clear();
    }
}
