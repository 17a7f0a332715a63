//! Core domain types for the active workout session.
//!
//! This module defines the session record and everything nested in it:
//! - Exercises and their rest policy
//! - Sets and their type tags
//! - Per-exercise rest timers
//!
//! Field names follow the persisted JSON layout, so a serialized `Session`
//! is exactly what lands in the storage slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Set Types
// ============================================================================

/// Semantic tag of a set
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SetType {
    /// Normal working set
    #[default]
    N,
    /// Warm-up
    W,
    /// Taken to failure
    F,
    /// Left side
    L,
    /// Right side
    R,
    /// Drop set
    D,
    /// Top set
    T,
    /// Back-off set
    B,
    /// Feeder set
    FD,
}

impl SetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetType::N => "N",
            SetType::W => "W",
            SetType::F => "F",
            SetType::L => "L",
            SetType::R => "R",
            SetType::D => "D",
            SetType::T => "T",
            SetType::B => "B",
            SetType::FD => "FD",
        }
    }
}

impl FromStr for SetType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "N" => Ok(SetType::N),
            "W" => Ok(SetType::W),
            "F" => Ok(SetType::F),
            "L" => Ok(SetType::L),
            "R" => Ok(SetType::R),
            "D" => Ok(SetType::D),
            "T" => Ok(SetType::T),
            "B" => Ok(SetType::B),
            "FD" => Ok(SetType::FD),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One logged attempt of an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Set {
    pub id: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    pub kg: String,
    pub reps: String,
    pub done: bool,
    pub prev_kg: f64,
    pub prev_reps: f64,
}

// ============================================================================
// Exercise Types
// ============================================================================

/// One movement within a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    /// Session-local identity
    pub id: String,
    /// Catalog reference, opaque to the session
    pub id_exercise: Option<Value>,
    pub name: String,
    pub image_url: Option<String>,
    pub notes: String,
    #[serde(rename = "usesCustomRest")]
    pub uses_custom_rest: bool,
    #[serde(rename = "customRestSeconds")]
    pub custom_rest_seconds: Option<u32>,
    pub sets: Vec<Set>,
}

impl Exercise {
    pub fn set(&self, set_id: &str) -> Option<&Set> {
        self.sets.iter().find(|s| s.id == set_id)
    }

    pub fn set_mut(&mut self, set_id: &str) -> Option<&mut Set> {
        self.sets.iter_mut().find(|s| s.id == set_id)
    }

    /// Number of sets marked done
    pub fn completed_sets(&self) -> usize {
        self.sets.iter().filter(|s| s.done).count()
    }
}

/// Exercise-level fields that can be edited in place
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExerciseField {
    Name,
    Notes,
    ImageUrl,
    IdExercise,
}

impl FromStr for ExerciseField {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(ExerciseField::Name),
            "notes" => Ok(ExerciseField::Notes),
            "image_url" => Ok(ExerciseField::ImageUrl),
            "id_exercise" => Ok(ExerciseField::IdExercise),
            _ => Err(()),
        }
    }
}

/// Set-level fields that can be edited in place
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetField {
    Type,
    Kg,
    Reps,
    Done,
    PrevKg,
    PrevReps,
}

impl FromStr for SetField {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "type" => Ok(SetField::Type),
            "kg" => Ok(SetField::Kg),
            "reps" => Ok(SetField::Reps),
            "done" => Ok(SetField::Done),
            "prev_kg" => Ok(SetField::PrevKg),
            "prev_reps" => Ok(SetField::PrevReps),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Where a session came from; opaque provenance only
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoutineInfo {
    pub id: Value,
    pub name: String,
}

/// Countdown state of one exercise's rest timer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestTimer {
    #[serde(rename = "startedAt", with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    /// Seconds
    pub duration: u32,
}

/// The single active (or inactive) workout-tracking record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds accumulated before `started_at`
    pub duration_offset: u64,
    pub workout: Vec<Exercise>,
    pub routine_info: Option<RoutineInfo>,
    pub global_rest_seconds: u32,
    pub rest_timers: HashMap<String, RestTimer>,
}

impl Session {
    /// Canonical inactive session
    pub fn inactive(global_rest_seconds: u32) -> Self {
        Self {
            is_active: false,
            started_at: None,
            duration_offset: 0,
            workout: Vec::new(),
            routine_info: None,
            global_rest_seconds,
            rest_timers: HashMap::new(),
        }
    }

    pub fn exercise(&self, exercise_id: &str) -> Option<&Exercise> {
        self.workout.iter().find(|e| e.id == exercise_id)
    }

    pub fn exercise_mut(&mut self, exercise_id: &str) -> Option<&mut Exercise> {
        self.workout.iter_mut().find(|e| e.id == exercise_id)
    }

    /// Sets marked done and total sets across the workout, as `(done, total)`
    pub fn set_progress(&self) -> (usize, usize) {
        self.workout.iter().fold((0, 0), |(done, total), e| {
            (done + e.completed_sets(), total + e.sets.len())
        })
    }
}
