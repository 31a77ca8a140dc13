//! Scheduling metadata normalization and scoring.
//!
//! Every engine shares one ordering rule: an entry's place in a queue is a
//! single signed 64-bit score. A `dequeue-timestamp` maps to its microsecond
//! value, so the entry stays invisible until that instant. Otherwise the
//! current time in microseconds is divided by the priority: higher priority
//! means a smaller score and an earlier dequeue, while equal priorities keep
//! insertion order because the clock only moves forward.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Metadata travels as a JSON mapping; only two keys are interpreted.
pub type Metadata = Map<String, Value>;

/// Entries with this key are gated until the given instant.
pub const DEQUEUE_TIMESTAMP: &str = "dequeue-timestamp";
/// Entries with this key are dequeued ahead of lower priorities.
pub const PRIORITY: &str = "priority";

pub const MIN_PRIORITY: i64 = 1;
pub const MAX_PRIORITY: i64 = 100;

/// Wall clock in microseconds since the epoch.
#[inline]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

/// Normalize the scheduling fields of a metadata mapping.
///
/// Malformed values are repaired, never rejected: an unparseable
/// `dequeue-timestamp` becomes "now", and a priority outside
/// [`MIN_PRIORITY`]..=[`MAX_PRIORITY`] is clamped to `1`. Unknown keys pass
/// through untouched.
pub fn normalize_metadata(mut metadata: Metadata) -> Metadata {
    if let Some(timestamp) = metadata.get(DEQUEUE_TIMESTAMP) {
        if parse_instant_us(timestamp).is_none() {
            metadata.insert(
                DEQUEUE_TIMESTAMP.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
    }

    if let Some(priority) = metadata.get(PRIORITY) {
        let mut priority = coerce_integer(priority);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            priority = MIN_PRIORITY;
        }
        metadata.insert(PRIORITY.to_string(), Value::from(priority));
    }

    metadata
}

/// Score for a normalized metadata mapping.
///
/// Called both on `add` and on reservation put-back, so a rolled-back entry
/// is re-scored against the current clock rather than its original score.
pub fn score_from_metadata(metadata: &Metadata) -> i64 {
    if let Some(timestamp) = metadata.get(DEQUEUE_TIMESTAMP).and_then(parse_instant_us) {
        return timestamp;
    }

    let priority = metadata
        .get(PRIORITY)
        .map(coerce_integer)
        .filter(|p| *p >= MIN_PRIORITY)
        .unwrap_or(MIN_PRIORITY);
    now_us() / priority
}

/// Interpret a metadata value as an instant, in microseconds since the
/// epoch. Accepts RFC 3339 strings, integer epoch seconds, and fractional
/// epoch seconds.
pub fn parse_instant_us(value: &Value) -> Option<i64> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.timestamp_micros()),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                secs.checked_mul(1_000_000)
            } else {
                n.as_f64().map(|secs| (secs * 1_000_000.0) as i64)
            }
        }
        _ => None,
    }
}

/// Integer coercion in the spirit of the queue's lineage: numbers truncate,
/// strings parse, everything else is 0 (and then clamps to 1).
fn coerce_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(raw) => raw.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn clamps_out_of_range_priorities() {
        for bad in [0, 101, -10, 1000] {
            let normalized = normalize_metadata(meta(json!({ "priority": bad })));
            assert_eq!(normalized[PRIORITY], json!(1), "priority {bad}");
        }
    }

    #[test]
    fn keeps_valid_priorities() {
        let normalized = normalize_metadata(meta(json!({ "priority": 50 })));
        assert_eq!(normalized[PRIORITY], json!(50));
    }

    #[test]
    fn coerces_string_priorities() {
        let normalized = normalize_metadata(meta(json!({ "priority": "5" })));
        assert_eq!(normalized[PRIORITY], json!(5));

        let normalized = normalize_metadata(meta(json!({ "priority": "junk" })));
        assert_eq!(normalized[PRIORITY], json!(1));
    }

    #[test]
    fn replaces_invalid_timestamps_with_now() {
        let normalized = normalize_metadata(meta(json!({ "dequeue-timestamp": true })));
        let replaced = parse_instant_us(&normalized[DEQUEUE_TIMESTAMP]).unwrap();
        assert!((replaced - now_us()).abs() < 2_000_000);
    }

    #[test]
    fn keeps_valid_timestamps() {
        let ts = "2026-01-02T03:04:05+00:00";
        let normalized = normalize_metadata(meta(json!({ "dequeue-timestamp": ts })));
        assert_eq!(normalized[DEQUEUE_TIMESTAMP], json!(ts));
    }

    #[test]
    fn timestamp_overrides_priority_in_score() {
        let metadata = normalize_metadata(meta(json!({
            "dequeue-timestamp": 1_700_000_000,
            "priority": 100,
        })));
        assert_eq!(score_from_metadata(&metadata), 1_700_000_000 * 1_000_000);
    }

    #[test]
    fn higher_priority_scores_lower() {
        let low = score_from_metadata(&meta(json!({ "priority": 1 })));
        let high = score_from_metadata(&meta(json!({ "priority": 2 })));
        assert!(high < low);
    }

    #[test]
    fn equal_priority_scores_are_monotonic() {
        let first = score_from_metadata(&Metadata::new());
        let second = score_from_metadata(&Metadata::new());
        assert!(second >= first);
    }
}
