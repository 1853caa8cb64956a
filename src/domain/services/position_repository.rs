//! PositionRepository - latest observed position per (protocol, owner).
//!
//! Process-scoped with an explicit lifecycle: created at startup, cleared at
//! shutdown. Positions are recreated wholesale each cycle and swapped in by
//! atomic per-key replace, so a reader sees either the fully-old or
//! fully-new snapshot, never an interleaved one.

use crate::domain::entities::position::CanonicalPosition;
use crate::domain::entities::protocol::Protocol;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct PositionRepository {
    positions: RwLock<HashMap<(Protocol, String), CanonicalPosition>>,
}

impl PositionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot for the position's (protocol, owner) key.
    pub fn replace(&self, position: CanonicalPosition) {
        let key = (position.protocol, position.owner.clone());
        match self.positions.write() {
            Ok(mut map) => {
                map.insert(key, position);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key, position);
            }
        }
    }

    pub fn get(&self, protocol: Protocol, owner: &str) -> Option<CanonicalPosition> {
        match self.positions.read() {
            Ok(map) => map.get(&(protocol, owner.to_string())).cloned(),
            Err(poisoned) => poisoned
                .into_inner()
                .get(&(protocol, owner.to_string()))
                .cloned(),
        }
    }

    /// Full snapshot of every latest position.
    pub fn snapshot(&self) -> Vec<CanonicalPosition> {
        match self.positions.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self.positions.read() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shutdown lifecycle: drop every snapshot.
    pub fn clear(&self) {
        match self.positions.write() {
            Ok(mut map) => map.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}
