use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use solguard::application::services::monitor_service::{MonitorService, MonitorSettings};
use solguard::config::AppConfig;
use solguard::domain::repositories::advisory::AdvisoryClient;
use solguard::domain::repositories::execution::{InstructionBuilder, TransactionBroadcaster};
use solguard::domain::services::activity_ledger::ActivityLedger;
use solguard::domain::services::decoders::kamino::KaminoDecoder;
use solguard::domain::services::decoders::marginfi::MarginFiDecoder;
use solguard::domain::services::decoders::solend::SolendDecoder;
use solguard::domain::services::decoders::AccountDecoder;
use solguard::domain::services::execution_coordinator::{ExecutionConfig, ExecutionCoordinator};
use solguard::domain::services::position_repository::PositionRepository;
use solguard::domain::services::strategy_engine::StrategyEngine;
use solguard::infrastructure::advisory_client::HttpAdvisoryClient;
use solguard::infrastructure::execution_clients::{JupiterQuoter, TransactionService};
use solguard::infrastructure::solana_rpc::SolanaRpcClient;
use solguard::persistence::ledger_store::SqliteLedgerStore;
use solguard::task_runner::{run_supervised, SupervisorConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solguard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    // Invalid thresholds or targets are fatal before the loop starts.
    let thresholds = config.risk_thresholds()?;
    let targets = config.strategy_targets()?;

    info!("SolGuard position monitor starting");
    info!(
        "Protocols: Solend, MarginFi, Kamino; {} watched owner(s)",
        config.watched_owners.len()
    );
    if config.watched_owners.is_empty() {
        warn!("WATCHED_OWNERS is empty; cycles will monitor nothing");
    }

    let pool = solguard::persistence::init_database(&config.database_url).await?;
    let store = Arc::new(SqliteLedgerStore::new(pool));
    // Refuses to start on a chain it cannot prove intact.
    let ledger = Arc::new(ActivityLedger::open(store).await?);

    let rpc = Arc::new(SolanaRpcClient::new(
        config.rpc_url.clone(),
        config.fetch_timeout(),
    )?);
    let decoders: Vec<Arc<dyn AccountDecoder>> = vec![
        Arc::new(SolendDecoder::new()),
        Arc::new(MarginFiDecoder::new()),
        Arc::new(KaminoDecoder::new()),
    ];
    let advisory: Option<Arc<dyn AdvisoryClient>> = match &config.advisory_url {
        Some(url) => Some(Arc::new(HttpAdvisoryClient::new(
            url.clone(),
            config.advisory_timeout(),
        )?)),
        None => None,
    };

    let quoter = Arc::new(JupiterQuoter::new(
        config.quote_api_url.clone(),
        config.execution_timeout(),
    )?);
    let transactions = Arc::new(TransactionService::new(
        config.signer_service_url.clone(),
        config.rpc_url.clone(),
        config.execution_timeout(),
    )?);
    let builder: Arc<dyn InstructionBuilder> = transactions.clone();
    let broadcaster: Arc<dyn TransactionBroadcaster> = transactions;
    let coordinator = Arc::new(ExecutionCoordinator::new(
        quoter,
        builder,
        broadcaster,
        ledger.clone(),
        ExecutionConfig {
            max_attempts: config.execution_max_attempts,
            confirmation_timeout: config.confirmation_timeout(),
            idempotency_bucket_secs: config.idempotency_bucket_seconds,
            ..ExecutionConfig::default()
        },
    ));

    let settings = MonitorSettings {
        watched_owners: config.watched_owners.clone(),
        thresholds,
        min_confidence: config.min_confidence_threshold,
        max_concurrent_fetches: config.max_concurrent_fetches,
        fetch_timeout: config.fetch_timeout(),
        cycle_timeout: config.cycle_timeout(),
    };
    let monitor = Arc::new(MonitorService::new(
        settings,
        rpc,
        decoders,
        advisory,
        StrategyEngine::new(targets),
        Arc::new(PositionRepository::new()),
        coordinator,
        ledger,
    ));

    monitor.log_startup().await?;

    // Supervised monitoring loop.
    let monitor_loop = monitor.clone();
    let supervisor = SupervisorConfig {
        interval: Duration::from_secs(config.check_interval_seconds),
        ..SupervisorConfig::default()
    };
    tokio::spawn(async move {
        run_supervised("monitoring_cycle", supervisor, || {
            let monitor = monitor_loop.clone();
            async move { monitor.run_bounded_cycle().await }
        })
        .await;
    });

    // Read-only status surface.
    let app = Router::new()
        .route("/", get(|| async { "SolGuard position monitor is running" }))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/positions", get(positions))
        .route("/ledger/verify", get(ledger_verify))
        .route("/ledger/summary", get(ledger_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(monitor.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.status_port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    monitor.shutdown();
    Ok(())
}

async fn health(State(monitor): State<Arc<MonitorService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "ledger_tip": monitor.ledger().tip_hash().await,
    }))
}

async fn status(State(monitor): State<Arc<MonitorService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "stats": monitor.stats().await,
        "last_cycle": monitor.last_cycle().await,
    }))
}

async fn positions(State(monitor): State<Arc<MonitorService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "positions": monitor.repository().snapshot(),
    }))
}

async fn ledger_verify(State(monitor): State<Arc<MonitorService>>) -> Json<serde_json::Value> {
    match monitor.ledger().verify().await {
        Ok((valid, entries_checked)) => Json(serde_json::json!({
            "valid": valid,
            "entries_checked": entries_checked,
        })),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}

async fn ledger_summary(State(monitor): State<Arc<MonitorService>>) -> Json<serde_json::Value> {
    match monitor.ledger().summary().await {
        Ok(summary) => Json(serde_json::json!(summary)),
        Err(e) => Json(serde_json::json!({ "error": e.to_string() })),
    }
}
