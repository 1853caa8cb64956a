//! Monitoring Cycle End-to-End Tests
//!
//! Drives the full fetch → decode → classify → decide → execute → log
//! pipeline against canned RPC buffers and counting execution
//! collaborators. Covers:
//! 1. A critical Solend obligation produces one logged decision and one
//!    confirmed execution.
//! 2. A failing owner/protocol fetch is isolated and never aborts the
//!    cycle for other pairs.
//! 3. Repeated cycles inside one idempotency bucket coalesce to a single
//!    external side effect.
//! 4. The activity ledger stays valid and gap-free through it all.

use async_trait::async_trait;
use solguard::application::services::monitor_service::{MonitorService, MonitorSettings};
use solguard::domain::entities::decision::StrategyDecision;
use solguard::domain::entities::position::CanonicalPosition;
use solguard::domain::entities::risk::RiskThresholds;
use solguard::domain::errors::{ExecutionError, RpcError};
use solguard::domain::repositories::chain_rpc::{AccountFilter, ChainRpc, RawAccount};
use solguard::domain::repositories::execution::{
    BuiltTransaction, ConfirmationStatus, InstructionBuilder, SwapQuote, SwapQuoter,
    TransactionBroadcaster,
};
use solguard::domain::repositories::ledger_store::MemoryLedgerStore;
use solguard::domain::services::activity_ledger::ActivityLedger;
use solguard::domain::services::decoders::solend::SolendDecoder;
use solguard::domain::services::decoders::AccountDecoder;
use solguard::domain::services::execution_coordinator::{ExecutionConfig, ExecutionCoordinator};
use solguard::domain::services::position_repository::PositionRepository;
use solguard::domain::services::strategy_engine::{StrategyEngine, StrategyTargets};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAD_RAW: u128 = 1_000_000_000_000_000_000;

/// Hand-built Solend obligation buffer: aggregates plus one deposit and one
/// borrow entry, health factor = deposited * (unhealthy/deposited) / borrowed.
fn solend_obligation(deposited_usd: u128, borrowed_usd: u128, unhealthy_usd: u128) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(1u8); // version
    buf.extend_from_slice(&42u64.to_le_bytes()); // last_update_slot
    buf.push(0u8); // stale
    buf.extend_from_slice(&[0xAA; 32]); // lending_market
    buf.extend_from_slice(&[0xBB; 32]); // owner
    buf.extend_from_slice(&(deposited_usd * WAD_RAW).to_le_bytes());
    buf.extend_from_slice(&(borrowed_usd * WAD_RAW).to_le_bytes());
    buf.extend_from_slice(&(deposited_usd * WAD_RAW * 3 / 4).to_le_bytes()); // allowed
    buf.extend_from_slice(&(unhealthy_usd * WAD_RAW).to_le_bytes());
    buf.push(1u8); // deposits_len
    buf.push(1u8); // borrows_len
                   // deposit entry: reserve + amount u64 + market_value u128
    buf.extend_from_slice(&[0x01; 32]);
    buf.extend_from_slice(&1_000_000_000u64.to_le_bytes());
    buf.extend_from_slice(&(deposited_usd * WAD_RAW).to_le_bytes());
    // borrow entry: reserve + cumulative rate u128 + amount u128 + value u128
    buf.extend_from_slice(&[0x02; 32]);
    buf.extend_from_slice(&WAD_RAW.to_le_bytes());
    buf.extend_from_slice(&(borrowed_usd * WAD_RAW).to_le_bytes());
    buf.extend_from_slice(&(borrowed_usd * WAD_RAW).to_le_bytes());
    buf
}

struct CannedRpc {
    accounts_by_owner: HashMap<String, Vec<Vec<u8>>>,
    failing_owners: Vec<String>,
}

#[async_trait]
impl ChainRpc for CannedRpc {
    async fn program_accounts(
        &self,
        _program_id: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<RawAccount>, RpcError> {
        let owner = &filters[0].bytes_base58;
        if self.failing_owners.contains(owner) {
            return Err(RpcError::Transport("connection refused".to_string()));
        }
        Ok(self
            .accounts_by_owner
            .get(owner)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, data)| RawAccount {
                pubkey: format!("{}-obligation-{}", owner, i),
                data,
            })
            .collect())
    }

    async fn account_info(&self, _pubkey: &str) -> Result<Option<RawAccount>, RpcError> {
        Ok(None)
    }
}

struct PassthroughQuoter;

#[async_trait]
impl SwapQuoter for PassthroughQuoter {
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_usd: f64,
    ) -> Result<SwapQuote, ExecutionError> {
        Ok(SwapQuote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount_usd,
            route_ref: "route".to_string(),
        })
    }
}

struct PassthroughBuilder;

#[async_trait]
impl InstructionBuilder for PassthroughBuilder {
    async fn build(
        &self,
        _position: &CanonicalPosition,
        _decision: &StrategyDecision,
        _quote: Option<&SwapQuote>,
    ) -> Result<BuiltTransaction, ExecutionError> {
        Ok(BuiltTransaction {
            payload_b64: "dHg=".to_string(),
        })
    }
}

struct CountingBroadcaster {
    broadcasts: AtomicU32,
}

#[async_trait]
impl TransactionBroadcaster for CountingBroadcaster {
    async fn broadcast(&self, _tx: &BuiltTransaction) -> Result<String, ExecutionError> {
        let n = self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("signature-{}", n))
    }

    async fn confirmation_status(
        &self,
        _tx_reference: &str,
    ) -> Result<ConfirmationStatus, ExecutionError> {
        Ok(ConfirmationStatus::Finalized)
    }
}

struct Harness {
    monitor: Arc<MonitorService>,
    broadcaster: Arc<CountingBroadcaster>,
    ledger: Arc<ActivityLedger>,
}

async fn harness(rpc: CannedRpc, owners: Vec<&str>) -> Harness {
    let ledger = Arc::new(
        ActivityLedger::open(Arc::new(MemoryLedgerStore::new()))
            .await
            .unwrap(),
    );
    let broadcaster = Arc::new(CountingBroadcaster {
        broadcasts: AtomicU32::new(0),
    });
    let coordinator = Arc::new(ExecutionCoordinator::new(
        Arc::new(PassthroughQuoter),
        Arc::new(PassthroughBuilder),
        broadcaster.clone(),
        ledger.clone(),
        ExecutionConfig {
            confirmation_poll_interval: Duration::from_millis(5),
            ..ExecutionConfig::default()
        },
    ));
    let decoders: Vec<Arc<dyn AccountDecoder>> = vec![Arc::new(SolendDecoder::new())];
    let monitor = Arc::new(MonitorService::new(
        MonitorSettings {
            watched_owners: owners.into_iter().map(String::from).collect(),
            thresholds: RiskThresholds::default(),
            min_confidence: 0.7,
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_millis(500),
            cycle_timeout: Duration::from_secs(10),
        },
        Arc::new(rpc),
        decoders,
        None,
        StrategyEngine::new(StrategyTargets::default()),
        Arc::new(PositionRepository::new()),
        coordinator,
        ledger.clone(),
    ));
    Harness {
        monitor,
        broadcaster,
        ledger,
    }
}

#[tokio::test]
async fn test_critical_position_flows_through_to_confirmed_execution() {
    // deposited 5000, borrowed 3800, unhealthy 4250 -> hf 1.118 -> CRITICAL
    let mut accounts = HashMap::new();
    accounts.insert(
        "owner1".to_string(),
        vec![solend_obligation(5000, 3800, 4250)],
    );
    let harness = harness(
        CannedRpc {
            accounts_by_owner: accounts,
            failing_owners: vec![],
        },
        vec!["owner1"],
    )
    .await;

    let summary = harness.monitor.run_cycle().await.unwrap();

    assert_eq!(summary.positions_seen, 1);
    assert_eq!(summary.at_risk, 1);
    assert_eq!(summary.decisions_made, 1);
    assert_eq!(summary.executions, 1);
    assert_eq!(harness.broadcaster.broadcasts.load(Ordering::SeqCst), 1);

    // Decision and execution are both observable through the ledger.
    let ledger_summary = harness.ledger.summary().await.unwrap();
    assert_eq!(ledger_summary.actions["risk_decision"], 1);
    assert_eq!(ledger_summary.actions["execution_result"], 1);
    assert!(ledger_summary.integrity_valid);

    // Repository holds the decoded snapshot.
    let positions = harness.monitor.repository().snapshot();
    assert_eq!(positions.len(), 1);
    assert!((positions[0].total_collateral_usd - 5000.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_healthy_position_produces_no_decision() {
    let mut accounts = HashMap::new();
    accounts.insert(
        "owner1".to_string(),
        vec![solend_obligation(50_000, 3_000, 42_500)],
    );
    let harness = harness(
        CannedRpc {
            accounts_by_owner: accounts,
            failing_owners: vec![],
        },
        vec!["owner1"],
    )
    .await;

    let summary = harness.monitor.run_cycle().await.unwrap();

    assert_eq!(summary.positions_seen, 1);
    assert_eq!(summary.at_risk, 0);
    assert_eq!(summary.decisions_made, 0);
    assert_eq!(harness.broadcaster.broadcasts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_owner_is_isolated_from_the_cycle() {
    let mut accounts = HashMap::new();
    accounts.insert(
        "owner2".to_string(),
        vec![solend_obligation(5000, 3800, 4250)],
    );
    let harness = harness(
        CannedRpc {
            accounts_by_owner: accounts,
            failing_owners: vec!["owner1".to_string()],
        },
        vec!["owner1", "owner2"],
    )
    .await;

    let summary = harness.monitor.run_cycle().await.unwrap();

    assert_eq!(summary.fetch_failures, 1);
    // owner2's position still made it all the way through.
    assert_eq!(summary.positions_seen, 1);
    assert_eq!(summary.decisions_made, 1);
    assert_eq!(summary.executions, 1);
}

#[tokio::test]
async fn test_repeat_cycles_coalesce_inside_idempotency_bucket() {
    let mut accounts = HashMap::new();
    accounts.insert(
        "owner1".to_string(),
        vec![solend_obligation(5000, 3800, 4250)],
    );
    let harness = harness(
        CannedRpc {
            accounts_by_owner: accounts,
            failing_owners: vec![],
        },
        vec!["owner1"],
    )
    .await;

    harness.monitor.run_cycle().await.unwrap();
    harness.monitor.run_cycle().await.unwrap();

    // Same position, same time bucket: exactly one external side effect.
    assert_eq!(harness.broadcaster.broadcasts.load(Ordering::SeqCst), 1);
    let ledger_summary = harness.ledger.summary().await.unwrap();
    assert_eq!(ledger_summary.actions["execution_coalesced"], 1);
    assert!(ledger_summary.integrity_valid);
}

#[tokio::test]
async fn test_ledger_chain_remains_gap_free_across_cycles() {
    let mut accounts = HashMap::new();
    accounts.insert(
        "owner1".to_string(),
        vec![solend_obligation(5000, 3800, 4250)],
    );
    accounts.insert(
        "owner2".to_string(),
        vec![solend_obligation(50_000, 3_000, 42_500)],
    );
    let harness = harness(
        CannedRpc {
            accounts_by_owner: accounts,
            failing_owners: vec![],
        },
        vec!["owner1", "owner2"],
    )
    .await;

    for _ in 0..3 {
        harness.monitor.run_cycle().await.unwrap();
    }

    let (valid, checked) = harness.ledger.verify().await.unwrap();
    assert!(valid);
    assert!(checked > 0);
}
