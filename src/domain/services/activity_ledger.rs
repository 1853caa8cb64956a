//! ActivityLedger - hash-chained, append-only audit trail.
//!
//! Every classification, decision, and execution outcome passes through
//! here. Each entry hashes its own content plus the previous entry's hash,
//! so rewriting any persisted entry is detectable by replay. The only
//! mutable state is the chain tip `{sequence, previous_hash}`, updated
//! exactly once per successful append under a single-writer mutex. The
//! chain spans all positions, so sequence assignment needs one global
//! order even while decision-making runs concurrently elsewhere.

use crate::domain::entities::ledger::{LedgerEntry, GENESIS_HASH};
use crate::domain::errors::LedgerError;
use crate::domain::repositories::ledger_store::LedgerStore;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

struct ChainState {
    next_sequence: u64,
    previous_hash: String,
}

/// Aggregate view of the ledger for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub total_entries: u64,
    pub actions: HashMap<String, u64>,
    pub integrity_valid: bool,
    pub entries_verified: u64,
    pub last_hash: String,
}

pub struct ActivityLedger {
    store: Arc<dyn LedgerStore>,
    state: Mutex<ChainState>,
}

impl std::fmt::Debug for ActivityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLedger").finish_non_exhaustive()
    }
}

impl ActivityLedger {
    /// Open the ledger over a store, verifying the persisted chain and
    /// continuing from its tip.
    ///
    /// Fails closed: if the persisted chain cannot be proven intact, this
    /// refuses to produce a ledger at all, since appending on top of an
    /// unproven chain would launder the tampering.
    pub async fn open(store: Arc<dyn LedgerStore>) -> Result<Self, LedgerError> {
        let entries = store.load_all().await?;
        if let Some(sequence) = first_invalid_sequence(&entries)? {
            error!(sequence, "ledger chain verification failed at startup");
            return Err(LedgerError::IntegrityViolation {
                sequence,
                detail: "persisted chain failed startup verification".to_string(),
            });
        }

        let (next_sequence, previous_hash) = match entries.last() {
            Some(tip) => (tip.sequence + 1, tip.entry_hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };
        info!(
            entries = entries.len(),
            next_sequence, "activity ledger opened, chain verified"
        );

        Ok(ActivityLedger {
            store,
            state: Mutex::new(ChainState {
                next_sequence,
                previous_hash,
            }),
        })
    }

    /// Append one entry, extending the hash chain.
    pub async fn log(
        &self,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.state.lock().await;

        let timestamp_ms = Utc::now().timestamp_millis();
        let entry_hash = compute_entry_hash(
            action,
            &payload,
            &state.previous_hash,
            state.next_sequence,
            timestamp_ms,
        )?;
        let entry = LedgerEntry {
            sequence: state.next_sequence,
            action: action.to_string(),
            payload,
            timestamp_ms,
            previous_hash: state.previous_hash.clone(),
            entry_hash,
        };

        self.store.append(&entry).await?;

        // Tip advances only after the append is durable.
        state.next_sequence = entry.sequence + 1;
        state.previous_hash = entry.entry_hash.clone();

        debug!(
            action,
            sequence = entry.sequence,
            hash = &entry.entry_hash[..16.min(entry.entry_hash.len())],
            "activity logged"
        );
        Ok(entry)
    }

    /// Replay the persisted chain. Returns `(valid, entries_checked)`;
    /// on the first broken link or hash mismatch, `entries_checked` is the
    /// offending sequence number.
    pub async fn verify(&self) -> Result<(bool, u64), LedgerError> {
        let entries = self.store.load_all().await?;
        match first_invalid_sequence(&entries)? {
            Some(sequence) => Ok((false, sequence)),
            None => Ok((true, entries.len() as u64)),
        }
    }

    /// Status summary: entry counts per action plus verification state.
    pub async fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        let entries = self.store.load_all().await?;
        let mut actions: HashMap<String, u64> = HashMap::new();
        for entry in &entries {
            *actions.entry(entry.action.clone()).or_insert(0) += 1;
        }
        let (integrity_valid, entries_verified) = match first_invalid_sequence(&entries)? {
            Some(sequence) => (false, sequence),
            None => (true, entries.len() as u64),
        };
        let state = self.state.lock().await;
        Ok(LedgerSummary {
            total_entries: state.next_sequence,
            actions,
            integrity_valid,
            entries_verified,
            last_hash: state.previous_hash.clone(),
        })
    }

    /// Current chain tip hash.
    pub async fn tip_hash(&self) -> String {
        self.state.lock().await.previous_hash.clone()
    }
}

/// Hash input is a canonical serialization: a JSON object whose keys are
/// emitted in lexicographic order (serde_json map ordering), with the
/// timestamp as integral unix milliseconds. Two payloads that differ only
/// in key insertion order therefore hash identically.
fn compute_entry_hash(
    action: &str,
    payload: &serde_json::Value,
    previous_hash: &str,
    sequence: u64,
    timestamp_ms: i64,
) -> Result<String, LedgerError> {
    let canonical = serde_json::json!({
        "action": action,
        "payload": payload,
        "previous_hash": previous_hash,
        "sequence": sequence,
        "timestamp_ms": timestamp_ms,
    });
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| LedgerError::PersistenceFailure(format!("canonical serialization: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Replay a chain; `Ok(None)` when fully valid, else the first bad sequence.
fn first_invalid_sequence(entries: &[LedgerEntry]) -> Result<Option<u64>, LedgerError> {
    let mut previous_hash = GENESIS_HASH.to_string();
    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence != index as u64 {
            return Ok(Some(index as u64));
        }
        if entry.previous_hash != previous_hash {
            return Ok(Some(entry.sequence));
        }
        let recomputed = compute_entry_hash(
            &entry.action,
            &entry.payload,
            &entry.previous_hash,
            entry.sequence,
            entry.timestamp_ms,
        )?;
        if recomputed != entry.entry_hash {
            return Ok(Some(entry.sequence));
        }
        previous_hash = entry.entry_hash.clone();
    }
    Ok(None)
}
