//! Per-exercise rest timers.
//!
//! A timer is only a start instant and a length. Remaining time is derived
//! when asked for, so any number of screens can poll it without the store
//! scheduling a callback per exercise; callers that want a smooth countdown
//! poll at sub-second intervals. An expired timer keeps reporting zero until
//! it is stopped or restarted.

use crate::clock::whole_seconds_between;
use crate::normalize::clamp_seconds;
use crate::storage::SessionStorage;
use crate::store::SessionStore;
use crate::{Exercise, RestTimer, Session};
use chrono::{DateTime, Utc};

/// Rest an exercise should get: its own when it has one, otherwise the global rest
pub fn exercise_rest_preset(exercise: &Exercise, global_rest_seconds: u32) -> u32 {
    if exercise.uses_custom_rest {
        exercise.custom_rest_seconds.unwrap_or(0)
    } else {
        global_rest_seconds
    }
}

/// Seconds left on `timer` at `now`
pub fn remaining_seconds(timer: &RestTimer, now: DateTime<Utc>) -> u32 {
    let elapsed = whole_seconds_between(timer.started_at, now);
    u64::from(timer.duration).saturating_sub(elapsed) as u32
}

/// Start (or with zero seconds, clear) the timer of an exercise in the workout
///
/// Returns `None` when nothing changed.
pub(crate) fn arm_timer(
    session: &mut Session,
    exercise_id: &str,
    seconds: u32,
    now: DateTime<Utc>,
) -> Option<()> {
    session.exercise(exercise_id)?;
    if seconds == 0 {
        // A zero-length rest is no rest at all
        session.rest_timers.remove(exercise_id).map(|_| ())
    } else {
        session.rest_timers.insert(
            exercise_id.to_string(),
            RestTimer {
                started_at: now,
                duration: seconds,
            },
        );
        Some(())
    }
}

impl<S: SessionStorage> SessionStore<S> {
    /// Preset for an exercise in the current workout
    pub fn rest_preset(&self, exercise_id: &str) -> Option<u32> {
        let session = self.session();
        session
            .exercise(exercise_id)
            .map(|e| exercise_rest_preset(e, session.global_rest_seconds))
    }

    pub fn rest_timer(&self, exercise_id: &str) -> Option<&RestTimer> {
        self.session().rest_timers.get(exercise_id)
    }

    /// Start an exercise's rest timer, using `duration_override` if given
    pub fn start_rest_timer(&mut self, exercise_id: &str, duration_override: Option<i64>) -> bool {
        self.mutate("start_rest_timer", |session, now| {
            let exercise = session.exercise(exercise_id)?;
            let seconds = match duration_override {
                Some(seconds) => clamp_seconds(seconds as f64),
                None => exercise_rest_preset(exercise, session.global_rest_seconds),
            };
            tracing::debug!("Rest timer for {}: {}s", exercise_id, seconds);
            arm_timer(session, exercise_id, seconds, now)
        })
        .is_some()
    }

    pub fn stop_rest_timer(&mut self, exercise_id: &str) -> bool {
        self.mutate("stop_rest_timer", |session, _| {
            session.rest_timers.remove(exercise_id).map(|_| ())
        })
        .is_some()
    }

    /// Stop a running timer, or start one from the preset
    pub fn toggle_rest_timer(&mut self, exercise_id: &str) -> bool {
        if self.rest_timer(exercise_id).is_some() {
            self.stop_rest_timer(exercise_id)
        } else {
            self.start_rest_timer(exercise_id, None)
        }
    }

    /// Seconds left on an exercise's rest, zero when no timer is running
    pub fn rest_remaining(&self, exercise_id: &str) -> u32 {
        self.rest_timer(exercise_id)
            .map(|timer| remaining_seconds(timer, self.now()))
            .unwrap_or(0)
    }
}
