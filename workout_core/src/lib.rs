#![forbid(unsafe_code)]

//! Active workout session manager.
//!
//! This crate provides:
//! - Domain types (session, exercises, sets, rest timers)
//! - Payload normalization
//! - The session store and its rest timer operations
//! - The duration clock
//! - Persistence (storage slots, defensive restore, completed workout log)

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod normalize;
pub mod storage;
pub mod persist;
pub mod duration;
pub mod store;
pub mod rest;
pub mod handle;
pub mod workout_log;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SessionConfig};
pub use normalize::{normalize_exercise, normalize_set};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use persist::{is_canonical, restore_session, serialize_session, ACTIVE_WORKOUT_KEY};
pub use duration::{elapsed_seconds, DurationClock, TickListener};
pub use store::SessionStore;
pub use rest::{exercise_rest_preset, remaining_seconds};
pub use handle::SessionHandle;
pub use workout_log::{read_workouts, CompletedWorkout, JsonlSink, WorkoutSink};
