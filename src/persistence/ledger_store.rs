//! SQLite Ledger Store
//!
//! Durable backing for the activity ledger. Inserts are strictly ordered by
//! sequence (the primary key), and the chain is read back in sequence order
//! at startup.

use super::DbPool;
use crate::domain::entities::ledger::LedgerEntry;
use crate::domain::errors::LedgerError;
use crate::domain::repositories::ledger_store::LedgerStore;
use async_trait::async_trait;
use sqlx::Row;
use tracing::error;

pub struct SqliteLedgerStore {
    pool: DbPool,
}

impl SqliteLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let sequence: i64 = row.get("sequence");
    let payload_json: String = row.get("payload_json");
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| LedgerError::PersistenceFailure(format!("payload at {}: {}", sequence, e)))?;
    Ok(LedgerEntry {
        sequence: sequence as u64,
        action: row.get("action"),
        payload,
        timestamp_ms: row.get("logged_at_ms"),
        previous_hash: row.get("previous_hash"),
        entry_hash: row.get("entry_hash"),
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let payload_json = serde_json::to_string(&entry.payload)
            .map_err(|e| LedgerError::PersistenceFailure(format!("payload encode: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO activity_ledger (
                sequence, action, payload_json, entry_hash, previous_hash, logged_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.sequence as i64)
        .bind(&entry.action)
        .bind(&payload_json)
        .bind(&entry.entry_hash)
        .bind(&entry.previous_hash)
        .bind(entry.timestamp_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append ledger entry {}: {}", entry.sequence, e);
            LedgerError::PersistenceFailure(format!("append: {}", e))
        })?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, action, payload_json, entry_hash, previous_hash, logged_at_ms
            FROM activity_ledger
            ORDER BY sequence ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::PersistenceFailure(format!("load: {}", e)))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn load_tip(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT sequence, action, payload_json, entry_hash, previous_hash, logged_at_ms
            FROM activity_ledger
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::PersistenceFailure(format!("load tip: {}", e)))?;

        row.as_ref().map(row_to_entry).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ledger::GENESIS_HASH;
    use crate::persistence::init_database_with;

    fn entry(sequence: u64, previous_hash: &str) -> LedgerEntry {
        LedgerEntry {
            sequence,
            action: "risk_decision".to_string(),
            payload: serde_json::json!({ "sequence": sequence }),
            timestamp_ms: 1_700_000_000_000 + sequence as i64,
            previous_hash: previous_hash.to_string(),
            entry_hash: format!("hash-{}", sequence),
        }
    }

    #[tokio::test]
    async fn test_append_and_load_round_trip() {
        let pool = init_database_with("sqlite::memory:", 1).await.unwrap();
        let store = SqliteLedgerStore::new(pool);

        store.append(&entry(0, GENESIS_HASH)).await.unwrap();
        store.append(&entry(1, "hash-0")).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].previous_hash, GENESIS_HASH);
        assert_eq!(all[1].entry_hash, "hash-1");
        assert_eq!(all[1].payload["sequence"], 1);

        let tip = store.load_tip().await.unwrap().unwrap();
        assert_eq!(tip.sequence, 1);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let pool = init_database_with("sqlite::memory:", 1).await.unwrap();
        let store = SqliteLedgerStore::new(pool);
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.load_tip().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sequence_rejected() {
        let pool = init_database_with("sqlite::memory:", 1).await.unwrap();
        let store = SqliteLedgerStore::new(pool);
        store.append(&entry(0, GENESIS_HASH)).await.unwrap();
        let err = store.append(&entry(0, GENESIS_HASH)).await.unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
    }
}
