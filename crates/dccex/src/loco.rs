//! Per-address locomotive state and its persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::{Direction, MAX_FUNCTION, MAX_SPEED};
use crate::store::KeyValueStore;

/// Throttle state remembered for one locomotive address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocomotiveState {
    pub speed: u8,
    pub direction: Direction,
    pub invert_display: bool,
    pub functions: BTreeSet<u8>,
}

impl Default for LocomotiveState {
    /// Stopped, forward, not inverted, F0 (lights) on.
    fn default() -> Self {
        Self {
            speed: 0,
            direction: Direction::Forward,
            invert_display: false,
            functions: BTreeSet::from([0]),
        }
    }
}

impl LocomotiveState {
    /// Drop out-of-range values a hand-edited store may contain.
    fn sanitized(mut self) -> Self {
        self.speed = self.speed.min(MAX_SPEED);
        self.functions.retain(|f| *f <= MAX_FUNCTION);
        self
    }
}

/// Loads and saves [`LocomotiveState`] records.
///
/// The whole address map is stored as one JSON blob under a single key;
/// every save rewrites it. Store failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct LocoStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for LocoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocoStore").field("key", &self.key).finish()
    }
}

impl LocoStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Every stored record; empty when the store is unreadable.
    pub fn load_all(&self) -> BTreeMap<u16, LocomotiveState> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "locomotive store unreadable");
                return BTreeMap::new();
            }
        };
        match serde_json::from_str::<BTreeMap<u16, LocomotiveState>>(&raw) {
            Ok(states) => states
                .into_iter()
                .map(|(address, state)| (address, state.sanitized()))
                .collect(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "discarding malformed locomotive store");
                BTreeMap::new()
            }
        }
    }

    /// Stored record for `address`, or the default record.
    pub fn load(&self, address: u16) -> LocomotiveState {
        self.load_all().remove(&address).unwrap_or_default()
    }

    /// Replace the record for `address`.
    pub fn save(&self, address: u16, state: &LocomotiveState) {
        let mut states = self.load_all();
        states.insert(address, state.clone());
        let raw = match serde_json::to_string(&states) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to encode locomotive store");
                return;
            }
        };
        match self.store.set(&self.key, &raw) {
            Ok(()) => debug!(address, speed = state.speed, "locomotive state saved"),
            Err(err) => warn!(address, error = %err, "failed to save locomotive state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("quota".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota".into()))
        }
    }

    fn memory() -> (LocoStore, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        (LocoStore::new(backing.clone(), "locos"), backing)
    }

    #[test]
    fn unknown_address_gets_default() {
        let (locos, _) = memory();
        let state = locos.load(3);
        assert_eq!(state.speed, 0);
        assert_eq!(state.direction, Direction::Forward);
        assert!(!state.invert_display);
        assert_eq!(state.functions, BTreeSet::from([0]));
    }

    #[test]
    fn save_then_load_returns_the_same_record() {
        let (locos, _) = memory();
        let state = LocomotiveState {
            speed: 126,
            direction: Direction::Backward,
            invert_display: true,
            functions: BTreeSet::from([1, 2, 28]),
        };
        locos.save(10239, &state);
        locos.save(3, &LocomotiveState::default());
        assert_eq!(locos.load(10239), state);
        assert_eq!(locos.load_all().len(), 2);
    }

    #[test]
    fn save_overwrites_in_full() {
        let (locos, backing) = memory();
        let mut state = LocomotiveState::default();
        state.functions.insert(5);
        locos.save(7, &state);
        locos.save(7, &LocomotiveState::default());
        assert_eq!(locos.load(7).functions, BTreeSet::from([0]));

        let raw = backing.get("locos").unwrap().unwrap();
        assert_eq!(
            raw,
            r#"{"7":{"speed":0,"direction":"forward","invertDisplay":false,"functions":[0]}}"#
        );
    }

    #[test]
    fn broken_store_is_invisible() {
        let locos = LocoStore::new(Arc::new(BrokenStore), "locos");
        locos.save(3, &LocomotiveState::default());
        assert_eq!(locos.load(3), LocomotiveState::default());
    }

    #[test]
    fn malformed_blob_is_discarded() {
        let (locos, backing) = memory();
        backing.set("locos", "[1,2").unwrap();
        assert!(locos.load_all().is_empty());
        backing
            .set(
                "locos",
                r#"{"4":{"speed":200,"direction":"backward","invertDisplay":false,"functions":[0,40]}}"#,
            )
            .unwrap();
        let state = locos.load(4);
        assert_eq!(state.speed, 126);
        assert_eq!(state.functions, BTreeSet::from([0]));
    }
}
