//! Session serialization and defensive reconstruction.
//!
//! Saving is a plain `serde_json` dump of [`Session`]. Loading is not the
//! inverse: the stored record may come from an older build or have been
//! damaged, so every field is coerced on its own with its own fallback and
//! one bad field never costs the rest of the session.

use crate::clock::to_millis_precision;
use crate::normalize::{clamp_seconds, coerce_number, restore_exercise};
use crate::{Result, RestTimer, RoutineInfo, Session};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Storage key holding the active session
pub const ACTIVE_WORKOUT_KEY: &str = "active_workout";

/// Serialize a session for its storage slot
pub fn serialize_session(session: &Session) -> Result<String> {
    Ok(serde_json::to_string(session)?)
}

/// Rebuild a session from raw slot contents
///
/// Returns the inactive default when the contents are not a JSON object.
/// `now` repairs rest timers with unusable start times.
pub fn restore_session(raw: &str, now: DateTime<Utc>, default_rest_seconds: u32) -> Session {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to parse stored session: {}. Using defaults.", e);
            return Session::inactive(default_rest_seconds);
        }
    };

    let Some(obj) = value.as_object() else {
        tracing::warn!("Stored session is not an object. Using defaults.");
        return Session::inactive(default_rest_seconds);
    };

    restore_fields(obj, now, default_rest_seconds)
}

/// Whether `raw` already holds exactly what `session` would serialize to
///
/// A restored session only needs writing back when loading had to repair it.
pub fn is_canonical(raw: &str, session: &Session) -> bool {
    match (
        serde_json::from_str::<Value>(raw),
        serde_json::to_value(session),
    ) {
        (Ok(stored), Ok(current)) => stored == current,
        _ => false,
    }
}

fn restore_fields(obj: &Map<String, Value>, now: DateTime<Utc>, default_rest: u32) -> Session {
    // The slot only exists while a session is active
    let is_active = match obj.get("isActive") {
        Some(Value::Bool(active)) => *active,
        other => {
            tracing::warn!("Stored isActive is {:?}; assuming active", other);
            true
        }
    };
    if !is_active {
        tracing::info!("Stored session is marked inactive, discarding it");
        return Session::inactive(default_rest);
    }

    let global_rest_seconds = field(obj, "globalRestSeconds", default_rest, |v| {
        coerce_number(v).filter(|n| *n >= 0.0).map(clamp_seconds)
    });

    let workout = field(obj, "workout", Vec::new(), |v| {
        v.as_array().map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| restore_exercise(Some(item), global_rest_seconds))
                .collect()
        })
    });

    let mut rest_timers = field(obj, "restTimers", HashMap::new(), |v| {
        v.as_object().map(|timers| {
            timers
                .iter()
                .map(|(id, timer)| (id.clone(), restore_rest_timer(id, timer, now)))
                .collect()
        })
    });
    rest_timers.retain(|id, _| {
        let known = workout.iter().any(|e| e.id == *id);
        if !known {
            tracing::warn!("Dropping rest timer for unknown exercise {}", id);
        }
        known
    });

    Session {
        is_active,
        started_at: field(obj, "startedAt", None, |v| Some(Some(parse_timestamp(v)?))),
        duration_offset: field(obj, "durationOffset", 0, |v| {
            coerce_number(v)
                .filter(|n| *n >= 0.0)
                .map(|n| n.floor() as u64)
        }),
        workout,
        routine_info: field(obj, "routineInfo", None, |v| Some(Some(parse_routine_info(v)?))),
        global_rest_seconds,
        rest_timers,
    }
}

/// Coerce one field, falling back to `default` when it is absent or unusable
fn field<T>(
    obj: &Map<String, Value>,
    key: &str,
    default: T,
    coerce: impl FnOnce(&Value) -> Option<T>,
) -> T {
    match obj.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => coerce(value).unwrap_or_else(|| {
            tracing::warn!("Stored {} is malformed ({}); using default", key, value);
            default
        }),
    }
}

fn restore_rest_timer(id: &str, raw: &Value, now: DateTime<Utc>) -> RestTimer {
    let started_at = raw.get("startedAt").and_then(parse_timestamp);
    let duration = raw
        .get("duration")
        .and_then(coerce_number)
        .map(clamp_seconds);

    if started_at.is_none() || duration.is_none() {
        tracing::warn!("Repairing malformed rest timer for exercise {}", id);
    }

    RestTimer {
        started_at: started_at.unwrap_or(now),
        duration: duration.unwrap_or(0),
    }
}

/// Epoch milliseconds, as a number or numeric string
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let millis = coerce_number(value)?;
    if millis < 0.0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .map(to_millis_precision)
}

fn parse_routine_info(value: &Value) -> Option<RoutineInfo> {
    let obj = value.as_object()?;
    let id = obj.get("id").filter(|v| !v.is_null())?.clone();
    let name = match obj.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => String::new(),
    };
    Some(RoutineInfo { id, name })
}
