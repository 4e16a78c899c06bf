use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::ledger::{Step, StepIndex, StepLedger};
use crate::gate::token::SessionToken;

/// What gets written to the storage slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub steps: BTreeMap<StepIndex, Step>,
    pub session_token: SessionToken,
    pub timestamp: i64,
}

impl Snapshot {
    pub fn capture(ledger: &StepLedger, token: &SessionToken, now_ms: i64) -> Self {
        Snapshot {
            steps: ledger.steps().clone(),
            session_token: token.clone(),
            timestamp: now_ms,
        }
    }

    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        let age = now_ms - self.timestamp;
        (0..ttl_ms).contains(&age)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid percent encoding")]
    Percent,
    #[error("invalid snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reversible scrambling of the stored payload. Only keeps the slot from
/// being readable at a glance; anyone can undo it.
pub struct Obfuscation;

impl Obfuscation {
    pub fn encode(snapshot: &Snapshot) -> Result<String, CodecError> {
        let json = serde_json::to_string(snapshot)?;
        let reversed: String = urlencoding::encode(&json).chars().rev().collect();
        Ok(BASE64.encode(reversed))
    }

    pub fn try_decode(payload: &str) -> Result<Snapshot, CodecError> {
        let bytes = BASE64.decode(payload.trim())?;
        let reversed: String = String::from_utf8(bytes)?.chars().rev().collect();
        let json = urlencoding::decode(&reversed).map_err(|_| CodecError::Percent)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn decode(payload: &str) -> Option<Snapshot> {
        match Obfuscation::try_decode(payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!("Discarding stored progress: {}", e);
                None
            }
        }
    }
}

/// A single string value under a fixed key.
pub trait SlotStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory slot. Clones share the same backing map.
#[derive(Clone, Default)]
pub struct MemorySlot {
    values: Rc<RefCell<HashMap<String, String>>>,
}

impl SlotStorage for MemorySlot {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.borrow_mut().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }
}

pub struct SnapshotStore {
    storage: Box<dyn SlotStorage>,
    key: String,
    ttl_ms: i64,
}

impl SnapshotStore {
    pub fn new(storage: Box<dyn SlotStorage>, key: impl Into<String>, ttl_ms: i64) -> Self {
        SnapshotStore {
            storage,
            key: key.into(),
            ttl_ms,
        }
    }

    pub fn save(&self, snapshot: &Snapshot) {
        match Obfuscation::encode(snapshot) {
            Ok(payload) => self.storage.set(&self.key, &payload),
            Err(e) => debug!("Could not encode progress: {}", e),
        }
    }

    pub fn load(&self, now_ms: i64) -> Option<Snapshot> {
        let payload = self.storage.get(&self.key)?;
        let snapshot = Obfuscation::decode(&payload)?;
        if !snapshot.is_fresh(now_ms, self.ttl_ms) {
            debug!("Stored progress from {} has expired", snapshot.timestamp);
            return None;
        }
        Some(snapshot)
    }

    pub fn clear(&self) {
        self.storage.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::gate::ledger::Ordering;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn sample() -> Snapshot {
        let mut ledger = StepLedger::new(3, Ordering::Sequential);
        ledger.mark_clicked(1, 1_000, true).unwrap();
        ledger.mark_verified(1, 9_000).unwrap();
        ledger.mark_clicked(2, 12_000, false).unwrap();
        Snapshot::capture(&ledger, &SessionToken::from_raw("S1NfMTIzX2FiYw=="), 15_000)
    }

    #[test]
    fn decode_reverses_encode() {
        let snapshot = sample();
        let payload = Obfuscation::encode(&snapshot).unwrap();
        assert_eq!(Obfuscation::decode(&payload), Some(snapshot));
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<Option<i64>>()).prop_map(
            |(clicked, window_opened, verified, timestamp)| Step {
                clicked,
                window_opened,
                verified,
                timestamp,
            },
        )
    }

    fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
        (
            prop::collection::btree_map(any::<u8>(), arb_step(), 0..6),
            prop_oneof![
                any::<String>(),
                "[A-Za-z0-9%_+/=]{0,40}",
                "[é漢ü%_ ]{1,12}",
            ],
            prop_oneof![any::<i64>(), Just(i64::MIN), Just(i64::MAX), -1_000i64..1_000],
        )
            .prop_map(|(steps, token, timestamp)| Snapshot {
                steps,
                session_token: SessionToken::from_raw(token),
                timestamp,
            })
    }

    proptest! {
        #[test]
        fn any_snapshot_survives_encoding(snapshot in arb_snapshot()) {
            let payload = Obfuscation::encode(&snapshot).unwrap();
            prop_assert!(payload.is_ascii());
            prop_assert_eq!(Obfuscation::try_decode(&payload).ok(), Some(snapshot));
        }
    }

    #[test]
    fn payload_hides_plain_json() {
        let payload = Obfuscation::encode(&sample()).unwrap();
        assert!(!payload.contains("verified"));
        assert!(!payload.contains("sessionToken"));
    }

    #[test]
    fn wire_shape_uses_camel_case_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["steps"]["1"]["verified"], true);
        assert_eq!(json["steps"]["2"]["windowOpened"], false);
        assert_eq!(json["sessionToken"], "S1NfMTIzX2FiYw==");
        assert_eq!(json["timestamp"], 15_000);
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert!(Obfuscation::decode("").is_none());
        assert!(Obfuscation::decode("%%%").is_none());
        assert!(Obfuscation::decode(&BASE64.encode("}{")).is_none());

        let mut payload = Obfuscation::encode(&sample()).unwrap();
        payload.truncate(payload.len() / 2);
        assert!(Obfuscation::decode(&payload).is_none());
    }

    #[test]
    fn load_honours_validity_window() {
        let slot = MemorySlot::default();
        let store = SnapshotStore::new(Box::new(slot.clone()), "key", DAY_MS);
        assert!(store.load(0).is_none());

        let snapshot = sample();
        store.save(&snapshot);
        assert!(slot.get("key").is_some());
        assert_eq!(store.load(snapshot.timestamp + DAY_MS - 1), Some(snapshot.clone()));
        assert!(store.load(snapshot.timestamp + DAY_MS).is_none());
        assert!(store.load(snapshot.timestamp - 1).is_none());
    }

    #[test]
    fn corrupted_slot_is_treated_as_absent() {
        let slot = MemorySlot::default();
        slot.set("key", "definitely not a snapshot");
        let store = SnapshotStore::new(Box::new(slot), "key", DAY_MS);
        assert!(store.load(0).is_none());
    }

    #[test]
    fn clear_removes_slot() {
        let slot = MemorySlot::default();
        let store = SnapshotStore::new(Box::new(slot.clone()), "key", DAY_MS);
        store.save(&sample());
        store.clear();
        assert!(slot.get("key").is_none());
        assert!(store.load(15_000).is_none());
    }
}
