//! Canonical serialization and replay-hashing of an event log.
//!
//! Two battles that apply the same commands against the same seed must
//! produce byte-identical canonical output, regardless of map insertion
//! order or serializer whitespace choices. This is what lets a stored
//! `replay_hash` stand in for the full event log when verifying a replay.

use sha2::{Digest, Sha256};

use crate::error::ScenarioError;
use crate::model::event::Event;

/// Serializes events with sorted object keys and no extraneous whitespace,
/// matching `json.dumps(events, sort_keys=True, separators=(",", ":"))`.
pub fn canonical_event_log(events: &[Event]) -> Result<String, ScenarioError> {
    let value = serde_json::to_value(events).map_err(|source| ScenarioError::Json { path: "<event log>".to_string(), source })?;
    let canonical = canonicalize(&value);
    let rendered = serde_json::to_string(&canonical).map_err(|source| ScenarioError::Json { path: "<event log>".to_string(), source })?;
    Ok(escape_non_ascii(&rendered))
}

/// Escapes every non-ASCII code point as a `\uXXXX` sequence (surrogate
/// pairs for codepoints above the BMP), matching Python's
/// `json.dumps(..., ensure_ascii=True)`. `serde_json` emits raw UTF-8 for
/// non-ASCII text, which would make the canonical form - and therefore the
/// replay hash - diverge from the documented cross-implementation contract.
fn escape_non_ascii(rendered: &str) -> String {
    let mut out = String::with_capacity(rendered.len());
    for ch in rendered.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Recursively sorts object keys so `serde_json`'s default map (a `BTreeMap`
/// once converted) emits them in the same order Python's `sort_keys=True` does.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest of the canonical event log, used as a compact replay
/// fingerprint in the final driver result.
pub fn replay_hash(events: &[Event]) -> Result<String, ScenarioError> {
    let canonical = canonical_event_log(events)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, event_type: &str) -> Event {
        Event {
            event_id: id.to_string(),
            round: 1,
            active_unit: "hero".to_string(),
            event_type: event_type.to_string(),
            payload: json!({"b": 1, "a": 2}),
        }
    }

    #[test]
    fn canonical_log_sorts_keys() {
        let log = canonical_event_log(&[event("ev_000000", "move")]).unwrap();
        let a_index = log.find("\"a\"").unwrap();
        let b_index = log.find("\"b\"").unwrap();
        assert!(a_index < b_index);
        assert!(!log.contains(", "));
        assert!(!log.contains(": "));
    }

    #[test]
    fn replay_hash_is_deterministic() {
        let events = vec![event("ev_000000", "move"), event("ev_000001", "strike")];
        let first = replay_hash(&events).unwrap();
        let second = replay_hash(&events).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn replay_hash_changes_with_payload() {
        let mut events = vec![event("ev_000000", "move")];
        let baseline = replay_hash(&events).unwrap();
        events[0].payload = json!({"b": 1, "a": 3});
        let changed = replay_hash(&events).unwrap();
        assert_ne!(baseline, changed);
    }

    #[test]
    fn canonical_log_escapes_non_ascii() {
        let mut ev = event("ev_000000", "narration");
        ev.payload = json!({"text": "caf\u{e9} \u{1f409}"});
        let log = canonical_event_log(&[ev]).unwrap();
        assert!(log.is_ascii());
        assert!(log.contains("\\u00e9"));
        // U+1F409 is above the BMP and must be encoded as a UTF-16 surrogate pair.
        assert!(log.contains("\\ud83d\\udc09"));
    }
}
