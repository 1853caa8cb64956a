//! Hash-chained activity ledger entries.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Previous-hash value of the first entry in a chain.
pub const GENESIS_HASH: &str = "genesis";

/// One tamper-evident entry in the append-only activity ledger.
///
/// `entry_hash` covers `(action, payload, previous_hash, sequence,
/// timestamp_ms)` under a canonical serialization, and each entry's
/// `previous_hash` equals the prior entry's `entry_hash`, so rewriting any
/// persisted entry breaks the chain from that point on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Gap-free, zero-based sequence number.
    pub sequence: u64,
    pub action: String,
    pub payload: serde_json::Value,
    /// Unix milliseconds; kept integral so the hash input is stable.
    pub timestamp_ms: i64,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl LedgerEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let entry = LedgerEntry {
            sequence: 0,
            action: "agent_start".to_string(),
            payload: serde_json::json!({}),
            timestamp_ms: 1_700_000_000_000,
            previous_hash: GENESIS_HASH.to_string(),
            entry_hash: String::new(),
        };
        assert_eq!(entry.timestamp().timestamp_millis(), 1_700_000_000_000);
    }
}
