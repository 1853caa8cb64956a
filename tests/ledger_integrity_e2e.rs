//! Activity Ledger Integrity End-to-End Tests
//!
//! Exercises the hash chain against the real SQLite store:
//! 1. N sequential appends verify as (true, N).
//! 2. Tampering any single persisted entry is detected at exactly that
//!    sequence number.
//! 3. A restart reloads the chain tip and continues, never resets.
//! 4. Startup verification of a tampered store is fatal.

use solguard::domain::errors::LedgerError;
use solguard::domain::repositories::ledger_store::LedgerStore;
use solguard::domain::services::activity_ledger::ActivityLedger;
use solguard::persistence::init_database_with;
use solguard::persistence::ledger_store::SqliteLedgerStore;
use solguard::persistence::DbPool;
use std::sync::Arc;

async fn memory_pool() -> DbPool {
    // One connection so sqlite::memory: stays a single database.
    init_database_with("sqlite::memory:", 1).await.unwrap()
}

async fn append_n(ledger: &ActivityLedger, n: usize) {
    for i in 0..n {
        ledger
            .log(
                "risk_decision",
                serde_json::json!({
                    "position_key": format!("obligation-{}", i),
                    "strategy": "debt_repayment",
                    "amount": 100.0 + i as f64,
                }),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_n_appends_verify_clean() {
    let pool = memory_pool().await;
    let ledger = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool)))
        .await
        .unwrap();

    append_n(&ledger, 25).await;

    assert_eq!(ledger.verify().await.unwrap(), (true, 25));
    let summary = ledger.summary().await.unwrap();
    assert_eq!(summary.total_entries, 25);
    assert_eq!(summary.actions["risk_decision"], 25);
}

#[tokio::test]
async fn test_tampered_payload_detected_at_first_bad_sequence() {
    let pool = memory_pool().await;
    let ledger = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())))
        .await
        .unwrap();
    append_n(&ledger, 10).await;

    // Rewrite history directly in the store, bypassing the chain.
    sqlx::query("UPDATE activity_ledger SET payload_json = ?1 WHERE sequence = 6")
        .bind(r#"{"amount":999999.0}"#)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(ledger.verify().await.unwrap(), (false, 6));
}

#[tokio::test]
async fn test_tampered_action_detected() {
    let pool = memory_pool().await;
    let ledger = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())))
        .await
        .unwrap();
    append_n(&ledger, 5).await;

    sqlx::query("UPDATE activity_ledger SET action = 'execution_result' WHERE sequence = 2")
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(ledger.verify().await.unwrap(), (false, 2));
}

#[tokio::test]
async fn test_restart_continues_chain_from_persisted_tip() {
    let pool = memory_pool().await;

    {
        let ledger = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())))
            .await
            .unwrap();
        append_n(&ledger, 8).await;
    }

    // "Restart": reopen over the same database.
    let reopened = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())))
        .await
        .unwrap();
    append_n(&reopened, 4).await;

    assert_eq!(reopened.verify().await.unwrap(), (true, 12));

    // Sequences are gap-free across the restart.
    let store = SqliteLedgerStore::new(pool);
    let entries = store.load_all().await.unwrap();
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64);
    }
    assert_eq!(entries[8].previous_hash, entries[7].entry_hash);
}

#[tokio::test]
async fn test_startup_refuses_tampered_chain() {
    let pool = memory_pool().await;
    {
        let ledger = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool.clone())))
            .await
            .unwrap();
        append_n(&ledger, 6).await;
    }

    sqlx::query("UPDATE activity_ledger SET entry_hash = 'forged' WHERE sequence = 3")
        .execute(&pool)
        .await
        .unwrap();

    let err = ActivityLedger::open(Arc::new(SqliteLedgerStore::new(pool)))
        .await
        .unwrap_err();
    match err {
        LedgerError::IntegrityViolation { sequence, .. } => assert_eq!(sequence, 3),
        other => panic!("expected integrity violation, got {:?}", other),
    }
}
