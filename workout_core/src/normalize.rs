//! Entity normalizer.
//!
//! Exercise and set payloads arrive from several callers in slightly
//! different shapes (routine data, ad-hoc additions, persisted state). These
//! pure functions coerce any JSON value into the canonical [`Exercise`] and
//! [`Set`] types. Nothing here fails: missing or malformed fields get
//! defaults.

use crate::{Exercise, Set, SetType};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name used when an exercise payload carries none
pub const DEFAULT_EXERCISE_NAME: &str = "Exercise";

/// Fresh session-local identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Coerce a raw set payload into a canonical set
pub fn normalize_set(raw: Option<&Value>) -> Set {
    let empty = Map::new();
    let obj = raw.and_then(Value::as_object).unwrap_or(&empty);

    Set {
        id: coerce_id(obj.get("id")).unwrap_or_else(new_id),
        set_type: obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(SetType::N),
        kg: coerce_text(obj.get("kg")),
        reps: coerce_text(obj.get("reps")),
        done: obj.get("done").map(truthy).unwrap_or(false),
        prev_kg: obj.get("prev_kg").and_then(coerce_number).unwrap_or(0.0),
        prev_reps: obj.get("prev_reps").and_then(coerce_number).unwrap_or(0.0),
    }
}

/// Coerce a raw exercise payload into a canonical exercise
///
/// `global_rest_seconds` seeds the custom rest when the payload asks for
/// custom rest without saying how long.
pub fn normalize_exercise(raw: Option<&Value>, global_rest_seconds: u32) -> Exercise {
    let mut exercise = restore_exercise(raw, global_rest_seconds);
    if exercise.sets.is_empty() {
        exercise.sets.push(normalize_set(None));
    }
    exercise
}

/// Like [`normalize_exercise`], but an explicit empty `sets` array stays empty
///
/// Used when reloading a stored session, where removing the last set is a
/// legitimate state. A missing or malformed `sets` field still gets one
/// default set.
pub(crate) fn restore_exercise(raw: Option<&Value>, global_rest_seconds: u32) -> Exercise {
    let empty = Map::new();
    let obj = raw.and_then(Value::as_object).unwrap_or(&empty);

    let sets: Vec<Set> = match obj.get("sets").and_then(Value::as_array) {
        Some(raw_sets) => raw_sets.iter().map(|s| normalize_set(Some(s))).collect(),
        None => vec![normalize_set(None)],
    };

    let raw_custom = obj.get("customRestSeconds").and_then(coerce_number);
    let uses_custom_rest = match obj.get("usesCustomRest") {
        Some(Value::Bool(explicit)) => *explicit,
        _ => raw_custom.is_some(),
    };
    let custom_rest_seconds = if uses_custom_rest {
        Some(raw_custom.map(clamp_seconds).unwrap_or(global_rest_seconds))
    } else {
        None
    };

    Exercise {
        id: coerce_id(obj.get("id")).unwrap_or_else(new_id),
        id_exercise: obj.get("id_exercise").filter(|v| !v.is_null()).cloned(),
        name: obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_EXERCISE_NAME)
            .to_string(),
        image_url: obj
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::to_string),
        notes: obj
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        uses_custom_rest,
        custom_rest_seconds,
        sets,
    }
}

/// Normalize every object in `raw`; anything that is not an object is skipped
pub fn normalize_exercises(raw: &[Value], global_rest_seconds: u32) -> Vec<Exercise> {
    raw.iter()
        .filter(|v| v.is_object())
        .map(|v| normalize_exercise(Some(v), global_rest_seconds))
        .collect()
}

/// Clamp any number of seconds into the `u32` range, rounding to whole seconds
pub fn clamp_seconds(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value.round() as u32
    }
}

/// Ids may arrive as strings or numbers
pub(crate) fn coerce_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric text: strings pass through, numbers are formatted, anything else is empty
pub(crate) fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Numbers or numeric strings
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Loose truthiness, matching what UI payloads put in boolean slots
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_sets_get_one_default_set() {
        let exercise = normalize_exercise(Some(&json!({"name": "Squat", "sets": []})), 90);

        assert_eq!(exercise.name, "Squat");
        assert_eq!(exercise.sets.len(), 1);
        let set = &exercise.sets[0];
        assert_eq!(set.set_type, SetType::N);
        assert!(!set.done);
        assert_eq!(set.kg, "");
        assert_eq!(set.reps, "");
        assert_eq!(set.prev_kg, 0.0);
        assert!(!set.id.is_empty());
    }

    #[test]
    fn test_restore_keeps_explicit_empty_sets() {
        let emptied = restore_exercise(Some(&json!({"name": "Lunge", "sets": []})), 90);
        assert!(emptied.sets.is_empty());

        let missing = restore_exercise(Some(&json!({"name": "Lunge"})), 90);
        assert_eq!(missing.sets.len(), 1);

        let malformed = restore_exercise(Some(&json!({"name": "Lunge", "sets": "three"})), 90);
        assert_eq!(malformed.sets.len(), 1);
    }

    #[test]
    fn test_missing_payload_gets_placeholder() {
        let exercise = normalize_exercise(None, 90);

        assert_eq!(exercise.name, DEFAULT_EXERCISE_NAME);
        assert_eq!(exercise.sets.len(), 1);
        assert!(!exercise.uses_custom_rest);
        assert_eq!(exercise.custom_rest_seconds, None);
        assert!(!exercise.id.is_empty());
    }

    #[test]
    fn test_set_coercions() {
        let set = normalize_set(Some(&json!({
            "id": 7,
            "type": "fd",
            "kg": 82.5,
            "reps": "8",
            "done": 1,
            "prev_kg": "80",
            "prev_reps": 8
        })));

        assert_eq!(set.id, "7");
        assert_eq!(set.set_type, SetType::FD);
        assert_eq!(set.kg, "82.5");
        assert_eq!(set.reps, "8");
        assert!(set.done);
        assert_eq!(set.prev_kg, 80.0);
        assert_eq!(set.prev_reps, 8.0);
    }

    #[test]
    fn test_unknown_set_type_falls_back_to_normal() {
        let set = normalize_set(Some(&json!({"type": "superset", "done": ""})));
        assert_eq!(set.set_type, SetType::N);
        assert!(!set.done);
    }

    #[test]
    fn test_custom_rest_inferred_from_numeric_field() {
        let exercise = normalize_exercise(Some(&json!({"customRestSeconds": 45})), 90);
        assert!(exercise.uses_custom_rest);
        assert_eq!(exercise.custom_rest_seconds, Some(45));
    }

    #[test]
    fn test_explicit_flag_wins_over_numeric_field() {
        let exercise = normalize_exercise(
            Some(&json!({"usesCustomRest": false, "customRestSeconds": 45})),
            90,
        );
        assert!(!exercise.uses_custom_rest);
        assert_eq!(exercise.custom_rest_seconds, None);
    }

    #[test]
    fn test_custom_rest_clamped_and_seeded() {
        let negative = normalize_exercise(Some(&json!({"customRestSeconds": -30})), 90);
        assert_eq!(negative.custom_rest_seconds, Some(0));

        let unspecified = normalize_exercise(Some(&json!({"usesCustomRest": true})), 75);
        assert!(unspecified.uses_custom_rest);
        assert_eq!(unspecified.custom_rest_seconds, Some(75));
    }

    #[test]
    fn test_opaque_fields_are_preserved() {
        let exercise = normalize_exercise(
            Some(&json!({
                "id": "local-1",
                "id_exercise": 314,
                "name": "Deadlift",
                "image_url": "https://img/deadlift.png",
                "notes": "belt on",
            })),
            90,
        );

        assert_eq!(exercise.id, "local-1");
        assert_eq!(exercise.id_exercise, Some(json!(314)));
        assert_eq!(exercise.image_url.as_deref(), Some("https://img/deadlift.png"));
        assert_eq!(exercise.notes, "belt on");
    }

    #[test]
    fn test_normalize_exercises_skips_non_objects() {
        let exercises = normalize_exercises(&[json!({"name": "Row"}), json!(3), json!(null)], 90);
        assert_eq!(exercises.len(), 1);
        assert_eq!(exercises[0].name, "Row");
    }

    #[test]
    fn test_clamp_seconds() {
        assert_eq!(clamp_seconds(-5.0), 0);
        assert_eq!(clamp_seconds(f64::NAN), 0);
        assert_eq!(clamp_seconds(29.6), 30);
        assert_eq!(clamp_seconds(1e12), u32::MAX);
    }
}
