use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workout_core::*;

#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Active workout session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new workout, replacing any active one
    Start {
        /// Exercise to include (repeatable)
        #[arg(long = "exercise")]
        exercises: Vec<String>,

        /// JSON file holding an array of exercise payloads
        #[arg(long)]
        from_json: Option<PathBuf>,

        /// Routine this workout comes from
        #[arg(long, requires = "routine_name")]
        routine_id: Option<String>,

        #[arg(long, requires = "routine_id")]
        routine_name: Option<String>,
    },

    /// Add exercises to the active workout
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove an exercise (and its rest timer)
    RemoveExercise { exercise: String },

    /// Append a set copied from the exercise's last set
    AddSet { exercise: String },

    /// Remove a set
    RemoveSet { exercise: String, set: String },

    /// Edit a set field (type, kg, reps, done, prev_kg, prev_reps)
    Set {
        exercise: String,
        set: String,
        field: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Replace an exercise's notes
    Note { exercise: String, text: String },

    /// Toggle a set's completion; completing it starts the rest timer
    Done { exercise: String, set: String },

    /// Control an exercise's rest timer
    Rest {
        #[command(subcommand)]
        action: RestAction,
    },

    /// Set the global rest in seconds
    RestGlobal {
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },

    /// Give an exercise its own rest, or return it to the global rest
    RestExercise {
        exercise: String,

        #[arg(allow_hyphen_values = true)]
        seconds: Option<i64>,

        #[arg(long, conflicts_with = "seconds")]
        global: bool,
    },

    /// Restart the workout clock at zero, keeping all sets
    ResetClock,

    /// Show the active workout (default)
    Status {
        /// Print the raw session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow the workout clock for a number of ticks
    Watch {
        #[arg(long, default_value_t = 5)]
        ticks: u32,
    },

    /// Log the workout and end it
    Finish,

    /// Discard the active workout without logging it
    Reset,
}

#[derive(Subcommand)]
enum RestAction {
    Start {
        exercise: String,

        /// Rest length instead of the exercise's preset
        #[arg(long, allow_hyphen_values = true)]
        seconds: Option<i64>,
    },
    Stop {
        exercise: String,
    },
    Toggle {
        exercise: String,
    },
}

type Store = SessionStore<FileStorage>;

fn main() -> Result<()> {
    workout_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    let mut store = SessionStore::with_system_clock(
        FileStorage::new(data_dir.join("session")),
        config.session.clone(),
    );
    let log_path = data_dir.join("workouts.jsonl");

    match cli.command.unwrap_or(Commands::Status { json: false }) {
        Commands::Start {
            exercises,
            from_json,
            routine_id,
            routine_name,
        } => cmd_start(&mut store, exercises, from_json, routine_id, routine_name),
        Commands::Status { json } => cmd_status(&store, json),
        Commands::Watch { ticks } => cmd_watch(&mut store, ticks),
        Commands::Finish => cmd_finish(&mut store, &log_path),
        Commands::Reset => {
            store.reset_workout();
            println!("Workout discarded.");
            Ok(())
        }
        command => {
            if !store.is_active() {
                println!("No active workout. Start one with `lift start`.");
                return Ok(());
            }
            cmd_edit(&mut store, command)
        }
    }
}

fn cmd_start(
    store: &mut Store,
    names: Vec<String>,
    from_json: Option<PathBuf>,
    routine_id: Option<String>,
    routine_name: Option<String>,
) -> Result<()> {
    let mut payloads = match from_json {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&contents)? {
                Value::Array(items) => items,
                _ => {
                    return Err(Error::Other(format!(
                        "{} must contain a JSON array of exercises",
                        path.display()
                    )))
                }
            }
        }
        None => Vec::new(),
    };
    payloads.extend(names.into_iter().map(|name| json!({ "name": name })));

    let routine_info = routine_id.zip(routine_name).map(|(id, name)| RoutineInfo {
        id: Value::String(id),
        name,
    });

    if store.is_active() {
        println!("Replacing the active workout.");
    }
    store.start_workout(&payloads, routine_info, None);

    println!("✓ Workout started with {} exercises", store.session().workout.len());
    Ok(())
}

fn cmd_edit(store: &mut Store, command: Commands) -> Result<()> {
    match command {
        Commands::Add { names } => {
            let payloads: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
            store.add_exercises(&payloads);
            println!("✓ Added {} exercises", payloads.len());
        }
        Commands::RemoveExercise { exercise } => {
            let exercise_id = resolve_exercise(store.session(), &exercise)?;
            store.remove_exercise(&exercise_id);
            println!("✓ Exercise removed");
        }
        Commands::AddSet { exercise } => {
            let exercise_id = resolve_exercise(store.session(), &exercise)?;
            if let Some(set_id) = store.add_set(&exercise_id) {
                println!("✓ Set added ({})", set_id);
            }
        }
        Commands::RemoveSet { exercise, set } => {
            let (exercise_id, set_id) = resolve_set(store.session(), &exercise, &set)?;
            store.remove_set(&exercise_id, &set_id);
            println!("✓ Set removed");
        }
        Commands::Set {
            exercise,
            set,
            field,
            value,
        } => {
            let (exercise_id, set_id) = resolve_set(store.session(), &exercise, &set)?;
            let value = match field.parse::<SetField>() {
                // Weights and reps are kept exactly as typed
                Ok(SetField::Kg | SetField::Reps) => Value::String(value),
                Ok(_) => parse_value(&value),
                Err(()) => return Err(Error::Other(format!("Unknown set field: {}", field))),
            };
            if store.update_exercise_field(&exercise_id, Some(&set_id), &field, &value) {
                println!("✓ Updated {}", field);
            } else {
                println!("Nothing to change.");
            }
        }
        Commands::Note { exercise, text } => {
            let exercise_id = resolve_exercise(store.session(), &exercise)?;
            if store.update_exercise_field(&exercise_id, None, "notes", &Value::String(text)) {
                println!("✓ Notes updated");
            } else {
                println!("Nothing to change.");
            }
        }
        Commands::Done { exercise, set } => {
            let (exercise_id, set_id) = resolve_set(store.session(), &exercise, &set)?;
            store.toggle_set_done(&exercise_id, &set_id);
            let done = store
                .session()
                .exercise(&exercise_id)
                .and_then(|e| e.set(&set_id))
                .map(|s| s.done)
                .unwrap_or(false);
            if done {
                println!("✓ Set done. Rest {}s", store.rest_remaining(&exercise_id));
            } else {
                println!("Set marked not done.");
            }
        }
        Commands::Rest { action } => match action {
            RestAction::Start { exercise, seconds } => {
                let exercise_id = resolve_exercise(store.session(), &exercise)?;
                store.start_rest_timer(&exercise_id, seconds);
                print_rest(store, &exercise_id);
            }
            RestAction::Stop { exercise } => {
                let exercise_id = resolve_exercise(store.session(), &exercise)?;
                store.stop_rest_timer(&exercise_id);
                println!("Rest timer stopped.");
            }
            RestAction::Toggle { exercise } => {
                let exercise_id = resolve_exercise(store.session(), &exercise)?;
                store.toggle_rest_timer(&exercise_id);
                print_rest(store, &exercise_id);
            }
        },
        Commands::RestGlobal { seconds } => {
            store.set_global_rest_seconds(seconds);
            println!("✓ Global rest: {}s", store.session().global_rest_seconds);
        }
        Commands::RestExercise {
            exercise,
            seconds,
            global,
        } => {
            let exercise_id = resolve_exercise(store.session(), &exercise)?;
            store.set_exercise_rest(&exercise_id, seconds, global);
            println!(
                "✓ Rest for this exercise: {}s",
                store.rest_preset(&exercise_id).unwrap_or(0)
            );
        }
        Commands::ResetClock => {
            store.reset_duration();
            println!("✓ Clock restarted");
        }
        Commands::Start { .. }
        | Commands::Status { .. }
        | Commands::Watch { .. }
        | Commands::Finish
        | Commands::Reset => unreachable!("handled before dispatch"),
    }
    Ok(())
}

fn cmd_status(store: &Store, as_json: bool) -> Result<()> {
    let session = store.session();

    if as_json {
        let out = json!({
            "session": session,
            "elapsedSeconds": store.elapsed_seconds(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if !session.is_active {
        println!("No active workout.");
        return Ok(());
    }

    let (done, total) = session.set_progress();
    println!(
        "Workout active · {} · {}/{} sets · global rest {}s",
        format_clock(store.elapsed_seconds()),
        done,
        total,
        session.global_rest_seconds
    );
    if let Some(routine) = &session.routine_info {
        println!("Routine: {}", routine.name);
    }

    for (i, exercise) in session.workout.iter().enumerate() {
        println!();
        let remaining = store.rest_remaining(&exercise.id);
        let rest = if store.rest_timer(&exercise.id).is_some() {
            format!(" · resting {}s left", remaining)
        } else {
            String::new()
        };
        println!(
            "{:>2}. {} [{}] · rest {}s{}",
            i + 1,
            exercise.name,
            exercise.id,
            exercise_rest_preset(exercise, session.global_rest_seconds),
            rest
        );
        if !exercise.notes.is_empty() {
            println!("    ✎ {}", exercise.notes);
        }
        if exercise.sets.is_empty() {
            println!("    (no sets)");
        }
        for (j, set) in exercise.sets.iter().enumerate() {
            println!(
                "    {}. {:<2} {:>6} kg × {:<4} {}",
                j + 1,
                set.set_type,
                display_or_dash(&set.kg),
                display_or_dash(&set.reps),
                if set.done { "✓" } else { "" }
            );
        }
    }
    Ok(())
}

fn cmd_watch(store: &mut Store, ticks: u32) -> Result<()> {
    if !store.is_active() {
        println!("No active workout.");
        return Ok(());
    }

    let (tx, rx) = channel::<u64>();
    let tx = Mutex::new(tx);
    store.set_tick_listener(Some(Arc::new(move |seconds| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(seconds);
        }
    })));

    let timeout = store.settings().tick_interval() * 5 + Duration::from_secs(1);
    for _ in 0..ticks {
        let seconds = match rx.recv_timeout(timeout) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::warn!("Duration clock stopped ticking: {}", e);
                break;
            }
        };
        let resting: Vec<String> = store
            .session()
            .workout
            .iter()
            .filter(|e| store.rest_timer(&e.id).is_some())
            .map(|e| format!("{} {}s", e.name, store.rest_remaining(&e.id)))
            .collect();
        if resting.is_empty() {
            println!("{}", format_clock(seconds));
        } else {
            println!("{} · rest: {}", format_clock(seconds), resting.join(", "));
        }
    }

    store.set_tick_listener(None);
    Ok(())
}

fn cmd_finish(store: &mut Store, log_path: &Path) -> Result<()> {
    let workout = match CompletedWorkout::from_session(
        store.session(),
        store.elapsed_seconds(),
        store.now(),
    ) {
        Some(workout) => workout,
        None => {
            println!("No active workout to finish.");
            return Ok(());
        }
    };

    // Only reset once the workout is safely recorded
    let mut sink = JsonlSink::new(log_path);
    sink.append(&workout)?;
    store.reset_workout();

    println!(
        "✓ Workout logged: {} exercises, {} sets done, {}",
        workout.exercises.len(),
        workout.completed_sets(),
        format_clock(workout.duration_seconds)
    );
    println!("  Log: {}", log_path.display());
    Ok(())
}

fn print_rest(store: &Store, exercise_id: &str) {
    if store.rest_timer(exercise_id).is_some() {
        println!("Resting: {}s", store.rest_remaining(exercise_id));
    } else {
        println!("No rest timer running.");
    }
}

/// Match an id exactly, else treat the selector as a 1-based position
fn resolve_exercise(session: &Session, selector: &str) -> Result<String> {
    if session.exercise(selector).is_some() {
        return Ok(selector.to_string());
    }
    position(selector, session.workout.len())
        .map(|i| session.workout[i].id.clone())
        .ok_or_else(|| Error::Other(format!("Unknown exercise: {}", selector)))
}

fn resolve_set(session: &Session, exercise: &str, selector: &str) -> Result<(String, String)> {
    let exercise_id = resolve_exercise(session, exercise)?;
    let sets = session
        .exercise(&exercise_id)
        .map(|e| e.sets.as_slice())
        .unwrap_or_default();
    let set_id = if sets.iter().any(|s| s.id == selector) {
        selector.to_string()
    } else {
        position(selector, sets.len())
            .map(|i| sets[i].id.clone())
            .ok_or_else(|| Error::Other(format!("Unknown set: {}", selector)))?
    };
    Ok((exercise_id, set_id))
}

fn position(selector: &str, len: usize) -> Option<usize> {
    selector
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

/// Values are JSON when they parse as JSON, plain text otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn format_clock(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

fn display_or_dash(text: &str) -> &str {
    if text.is_empty() {
        "-"
    } else {
        text
    }
}
