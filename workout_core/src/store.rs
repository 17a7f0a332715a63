//! The session store: single source of truth for the active workout.
//!
//! A `SessionStore` owns the session record, its storage slot and its
//! duration clock. Every mutation goes through [`SessionStore::mutate`],
//! which turns calls on an inactive session into silent no-ops and writes
//! the slot after each change. Mutations report whether anything changed.

use crate::clock::{to_millis_precision, Clock, SystemClock};
use crate::config::SessionConfig;
use crate::duration::{elapsed_seconds, DurationClock, TickListener};
use crate::normalize::{
    clamp_seconds, coerce_number, coerce_text, new_id, normalize_exercises, normalize_set, truthy,
    DEFAULT_EXERCISE_NAME,
};
use crate::persist::{is_canonical, restore_session, serialize_session, ACTIVE_WORKOUT_KEY};
use crate::storage::SessionStorage;
use crate::{Exercise, ExerciseField, RoutineInfo, Session, Set, SetField, SetType};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

pub struct SessionStore<S: SessionStorage> {
    session: Session,
    storage: S,
    clock: Arc<dyn Clock>,
    duration: DurationClock,
    settings: SessionConfig,
}

impl<S: SessionStorage> SessionStore<S> {
    /// Open the store on top of `storage`, restoring any persisted session
    pub fn open(storage: S, clock: Arc<dyn Clock>, settings: SessionConfig) -> Self {
        let duration = DurationClock::new(Arc::clone(&clock), settings.tick_interval());
        let mut store = Self {
            session: Session::inactive(settings.default_rest_seconds),
            storage,
            clock,
            duration,
            settings,
        };
        store.load();
        store
    }

    /// Open the store with the system clock
    pub fn with_system_clock(storage: S, settings: SessionConfig) -> Self {
        Self::open(storage, Arc::new(SystemClock), settings)
    }

    fn load(&mut self) {
        let raw = match self.storage.read(ACTIVE_WORKOUT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No stored workout, starting inactive");
                return;
            }
            Err(e) => {
                tracing::warn!("Unable to read stored workout: {}. Using defaults.", e);
                return;
            }
        };

        self.session = restore_session(
            &raw,
            self.clock.now(),
            self.settings.default_rest_seconds,
        );
        if self.session.is_active {
            tracing::info!(
                "Restored active workout with {} exercises",
                self.session.workout.len()
            );
        }
        self.sync_duration_clock();
        // Store the repaired record, or clear a slot that held nothing usable
        if !self.session.is_active || !is_canonical(&raw, &self.session) {
            tracing::debug!("Rewriting stored workout after repair");
            self.persist();
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> Session {
        self.session.clone()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Exact elapsed seconds, computed at call time
    pub fn elapsed_seconds(&self) -> u64 {
        if !self.session.is_active {
            return self.session.duration_offset;
        }
        elapsed_seconds(
            self.session.started_at,
            self.session.duration_offset,
            self.clock.now(),
        )
    }

    /// Seconds as last refreshed by the duration clock's ticker
    pub fn displayed_duration(&self) -> u64 {
        self.duration.displayed()
    }

    pub fn is_clock_ticking(&self) -> bool {
        self.duration.is_ticking()
    }

    /// Receive every duration tick; the listener must not call back into the store
    pub fn set_tick_listener(&mut self, listener: Option<TickListener>) {
        self.duration.set_listener(listener);
        self.sync_duration_clock();
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Replace whatever session exists with a fresh active one
    pub fn start_workout(
        &mut self,
        exercises: &[Value],
        routine_info: Option<RoutineInfo>,
        started_at: Option<DateTime<Utc>>,
    ) {
        let global_rest_seconds = self.settings.default_rest_seconds;
        self.session = Session {
            is_active: true,
            started_at: Some(started_at.map(to_millis_precision).unwrap_or_else(|| self.clock.now())),
            duration_offset: 0,
            workout: normalize_exercises(exercises, global_rest_seconds),
            routine_info,
            global_rest_seconds,
            rest_timers: Default::default(),
        };

        tracing::info!(
            "Started workout with {} exercises{}",
            self.session.workout.len(),
            self.session
                .routine_info
                .as_ref()
                .map(|r| format!(" from routine {:?}", r.name))
                .unwrap_or_default()
        );

        self.sync_duration_clock();
        self.persist();
    }

    /// Return to the inactive default and clear the storage slot
    pub fn reset_workout(&mut self) {
        self.session = Session::inactive(self.settings.default_rest_seconds);
        self.duration.halt(0);
        self.persist();
        tracing::info!("Workout reset");
    }

    /// Restart the clock at zero without touching the logged sets
    pub fn reset_duration(&mut self) -> bool {
        let changed = self
            .mutate("reset_duration", |session, now| {
                session.started_at = Some(now);
                session.duration_offset = 0;
                Some(())
            })
            .is_some();
        if changed {
            self.sync_duration_clock();
        }
        changed
    }

    // ------------------------------------------------------------------------
    // Exercises
    // ------------------------------------------------------------------------

    /// Normalize and append exercises
    pub fn add_exercises(&mut self, exercises: &[Value]) -> bool {
        self.mutate("add_exercises", |session, _| {
            let added = normalize_exercises(exercises, session.global_rest_seconds);
            if added.is_empty() {
                return None;
            }
            tracing::debug!("Adding {} exercises", added.len());
            session.workout.extend(added);
            Some(())
        })
        .is_some()
    }

    /// Remove an exercise together with its rest timer
    pub fn remove_exercise(&mut self, exercise_id: &str) -> bool {
        self.mutate("remove_exercise", |session, _| {
            let index = session.workout.iter().position(|e| e.id == exercise_id)?;
            session.workout.remove(index);
            session.rest_timers.remove(exercise_id);
            Some(())
        })
        .is_some()
    }

    /// Edit an exercise field (`set_id` absent) or a set field
    ///
    /// Unknown ids and field names are ignored, as are values equal to the
    /// current one.
    pub fn update_exercise_field(
        &mut self,
        exercise_id: &str,
        set_id: Option<&str>,
        field: &str,
        value: &Value,
    ) -> bool {
        self.mutate("update_exercise_field", |session, _| {
            let exercise = session.exercise_mut(exercise_id)?;
            match set_id {
                None => apply_exercise_field(exercise, field.parse::<ExerciseField>().ok()?, value),
                Some(set_id) => {
                    let field = field.parse::<SetField>().ok()?;
                    apply_set_field(exercise.set_mut(set_id)?, field, value)
                }
            }
        })
        .is_some()
    }

    /// Flip a set's `done` flag; completing a set starts the exercise's rest timer
    pub fn toggle_set_done(&mut self, exercise_id: &str, set_id: &str) -> bool {
        self.mutate("toggle_set_done", |session, now| {
            let global = session.global_rest_seconds;
            let exercise = session.exercise_mut(exercise_id)?;
            let preset = crate::rest::exercise_rest_preset(exercise, global);
            let set = exercise.set_mut(set_id)?;
            set.done = !set.done;
            if set.done {
                crate::rest::arm_timer(session, exercise_id, preset, now);
            }
            Some(())
        })
        .is_some()
    }

    // ------------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------------

    /// Append a copy of the exercise's last set; returns the new set id
    pub fn add_set(&mut self, exercise_id: &str) -> Option<String> {
        self.mutate("add_set", |session, _| {
            let exercise = session.exercise_mut(exercise_id)?;
            let set = match exercise.sets.last() {
                Some(template) => Set {
                    id: new_id(),
                    done: false,
                    ..template.clone()
                },
                None => normalize_set(None),
            };
            let id = set.id.clone();
            exercise.sets.push(set);
            Some(id)
        })
    }

    /// Remove a set; the exercise may end up with no sets
    pub fn remove_set(&mut self, exercise_id: &str, set_id: &str) -> bool {
        self.mutate("remove_set", |session, _| {
            let exercise = session.exercise_mut(exercise_id)?;
            let index = exercise.sets.iter().position(|s| s.id == set_id)?;
            exercise.sets.remove(index);
            if exercise.sets.is_empty() {
                tracing::debug!("Exercise {} has no sets left", exercise_id);
            }
            Some(())
        })
        .is_some()
    }

    // ------------------------------------------------------------------------
    // Rest policy
    // ------------------------------------------------------------------------

    /// Set the global rest; negative values clamp to zero
    pub fn set_global_rest_seconds(&mut self, seconds: i64) -> bool {
        let seconds = clamp_seconds(seconds as f64);
        self.mutate("set_global_rest_seconds", |session, _| {
            if session.global_rest_seconds == seconds {
                return None;
            }
            session.global_rest_seconds = seconds;
            Some(())
        })
        .is_some()
    }

    /// Give an exercise its own rest, or hand it back to the global rest
    pub fn set_exercise_rest(
        &mut self,
        exercise_id: &str,
        seconds: Option<i64>,
        use_global: bool,
    ) -> bool {
        self.mutate("set_exercise_rest", |session, _| {
            let exercise = session.exercise_mut(exercise_id)?;
            let (uses_custom_rest, custom_rest_seconds) = match seconds {
                Some(seconds) if !use_global => (true, Some(clamp_seconds(seconds as f64))),
                _ => (false, None),
            };
            if exercise.uses_custom_rest == uses_custom_rest
                && exercise.custom_rest_seconds == custom_rest_seconds
            {
                return None;
            }
            exercise.uses_custom_rest = uses_custom_rest;
            exercise.custom_rest_seconds = custom_rest_seconds;
            Some(())
        })
        .is_some()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Apply `op` to an active session and persist if it reports a change
    ///
    /// `op` returns `None` for "nothing changed" and must leave the session
    /// untouched in that case.
    pub(crate) fn mutate<R>(
        &mut self,
        name: &str,
        op: impl FnOnce(&mut Session, DateTime<Utc>) -> Option<R>,
    ) -> Option<R> {
        if !self.session.is_active {
            tracing::debug!("Ignoring {} while no workout is active", name);
            return None;
        }
        let now = self.clock.now();
        let result = op(&mut self.session, now)?;
        self.persist();
        Some(result)
    }

    /// Mirror the session into its storage slot
    fn persist(&mut self) {
        let outcome = if self.session.is_active {
            serialize_session(&self.session)
                .and_then(|raw| self.storage.write(ACTIVE_WORKOUT_KEY, &raw))
        } else {
            self.storage.remove(ACTIVE_WORKOUT_KEY)
        };
        if let Err(e) = outcome {
            tracing::warn!("Failed to persist workout: {}", e);
        }
    }

    fn sync_duration_clock(&mut self) {
        match (self.session.is_active, self.session.started_at) {
            (true, Some(anchor)) => self.duration.restart(anchor, self.session.duration_offset),
            _ => self.duration.halt(self.session.duration_offset),
        }
    }
}

fn apply_exercise_field(exercise: &mut Exercise, field: ExerciseField, value: &Value) -> Option<()> {
    match field {
        ExerciseField::Notes => {
            let notes = coerce_text(Some(value));
            if exercise.notes == notes {
                return None;
            }
            exercise.notes = notes;
        }
        ExerciseField::Name => {
            let text = coerce_text(Some(value));
            let name = if text.trim().is_empty() {
                DEFAULT_EXERCISE_NAME.to_string()
            } else {
                text
            };
            if exercise.name == name {
                return None;
            }
            exercise.name = name;
        }
        ExerciseField::ImageUrl => {
            let url = value.as_str().map(str::to_string);
            if exercise.image_url == url {
                return None;
            }
            exercise.image_url = url;
        }
        ExerciseField::IdExercise => {
            let id = Some(value.clone()).filter(|v| !v.is_null());
            if exercise.id_exercise == id {
                return None;
            }
            exercise.id_exercise = id;
        }
    }
    Some(())
}

fn apply_set_field(set: &mut Set, field: SetField, value: &Value) -> Option<()> {
    let mut updated = set.clone();
    match field {
        SetField::Type => {
            updated.set_type = value
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(SetType::N)
        }
        SetField::Kg => updated.kg = coerce_text(Some(value)),
        SetField::Reps => updated.reps = coerce_text(Some(value)),
        SetField::Done => updated.done = truthy(value),
        SetField::PrevKg => updated.prev_kg = coerce_number(value).unwrap_or(0.0),
        SetField::PrevReps => updated.prev_reps = coerce_number(value).unwrap_or(0.0),
    }
    if updated == *set {
        return None;
    }
    *set = updated;
    Some(())
}
