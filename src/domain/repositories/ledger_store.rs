//! Ledger Store Trait
//!
//! Append-only persistence behind the activity ledger. The store is dumb on
//! purpose: all chain-integrity logic (hashing, linkage, verification)
//! lives in the `ActivityLedger` service, so any ordered store qualifies.

use crate::domain::entities::ledger::LedgerEntry;
use crate::domain::errors::LedgerError;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one entry. Sequence numbers arrive strictly increasing.
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Load every entry in sequence order.
    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Load the highest-sequence entry, if any.
    async fn load_tip(&self) -> Result<Option<LedgerEntry>, LedgerError>;
}

/// Volatile in-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one stored entry in place, bypassing the chain. Exists so
    /// integrity tests can simulate tampering.
    pub async fn tamper(&self, sequence: u64, action: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.sequence == sequence) {
            entry.action = action.to_string();
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn load_tip(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries.lock().await.last().cloned())
    }
}
