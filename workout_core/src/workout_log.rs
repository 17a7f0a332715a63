//! Completed workout log.
//!
//! When a workout is finished the caller takes the final session, records it
//! and only then resets the store. Records are appended to a JSONL (JSON
//! Lines) file with file locking so concurrent writers never interleave.

use crate::{Exercise, Result, RoutineInfo, Session};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A finished workout as it is handed off for logging
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletedWorkout {
    pub id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub routine_info: Option<RoutineInfo>,
    pub exercises: Vec<Exercise>,
}

impl CompletedWorkout {
    /// Capture the final state of an active session
    ///
    /// Returns `None` for an inactive session; there is nothing to log.
    pub fn from_session(
        session: &Session,
        duration_seconds: u64,
        finished_at: DateTime<Utc>,
    ) -> Option<Self> {
        if !session.is_active {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            started_at: session.started_at,
            finished_at,
            duration_seconds,
            routine_info: session.routine_info.clone(),
            exercises: session.workout.clone(),
        })
    }

    pub fn completed_sets(&self) -> usize {
        self.exercises.iter().map(Exercise::completed_sets).sum()
    }
}

/// Destination for finished workouts
pub trait WorkoutSink {
    fn append(&mut self, workout: &CompletedWorkout) -> Result<()>;
}

/// JSONL-based workout sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl WorkoutSink for JsonlSink {
    fn append(&mut self, workout: &CompletedWorkout) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(workout)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended workout {} to log", workout.id);
        Ok(())
    }
}

/// Read all workouts from a log file, skipping lines that do not parse
pub fn read_workouts(path: &Path) -> Result<Vec<CompletedWorkout>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut workouts = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CompletedWorkout>(&line) {
            Ok(workout) => workouts.push(workout),
            Err(e) => {
                tracing::warn!("Failed to parse workout at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} workouts from log", workouts.len());
    Ok(workouts)
}
