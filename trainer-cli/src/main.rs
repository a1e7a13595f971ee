//! # Vocal Trainer - Terminal Host
//!
//! Command-line front end for the trainer core. It captures the default
//! microphone, runs one analysis pass per tick and prints the detected
//! note, a cent meter and exercise progress.
//!
//! ## Architecture
//! - **Audio Thread**: owns the cpal stream and forwards whole frames
//! - **Main Thread**: ~60 Hz tick loop driving `PracticeSession::tick`
//! - **Input Thread**: reads simple line commands from stdin
//! - **Communication**: Crossbeam channels between all three

mod display;
mod worker;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{info, warn};
use trainer_core::exercise::{ExerciseDefinition, ExercisePhase};
use trainer_core::storage::{ProgressStore, DEFAULT_USER};
use trainer_core::{Difficulty, Note, PracticeSession, TrainerConfig};
use worker::AudioWorker;

/// Tick rate of the analysis loop.
const TICKS_PER_SECOND: u32 = 60;
const TICK: Duration = Duration::from_millis(16);

/// Real-time vocal pitch trainer.
#[derive(Parser, Debug)]
#[command(name = "vocal-trainer")]
#[command(about = "Sing into the microphone and see how close you are to the note")]
struct Cli {
    /// Exercise definition (JSON) to run instead of free play
    #[arg(short, long)]
    exercise: Option<PathBuf>,

    /// Target note for free play, e.g. A4 or Bb3
    #[arg(short, long)]
    target: Option<Note>,

    /// Trainer configuration file (JSON); unspecified fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tolerance preset: easy, normal or hard
    #[arg(short, long)]
    difficulty: Option<Difficulty>,

    /// Shift every exercise note by this many semitones
    #[arg(long, allow_hyphen_values = true)]
    transpose: Option<i32>,

    /// Progress file shared by all users
    #[arg(long, default_value = "vocal_progress.json")]
    progress_file: PathBuf,

    /// Whose progress to load and update
    #[arg(short, long, default_value = DEFAULT_USER)]
    user: String,

    /// Date label recorded as the last practice day, e.g. 2024-05-01
    #[arg(long)]
    today: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,
}

/// Line commands typed while the trainer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Freeze,
    Restart,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("[MAIN] Starting vocal trainer...");

    let config = build_config(&cli)?;
    let hold_secs = config.required_hold_secs;
    let frame_size = config.frame_size;

    let store = ProgressStore::new(&cli.progress_file, cli.user.clone());
    let all_time = store.load().unwrap_or_else(|e| {
        warn!("[MAIN] Starting with fresh progress: {}", e);
        Default::default()
    });
    println!("{}", display::level_text(&all_time));
    if let Some(today) = &cli.today {
        if !all_time.practiced_on(today) {
            println!("You haven't practised yet today.");
        }
    }

    let mut session = PracticeSession::new(config)?.with_progress(all_time);
    if let Some(today) = cli.today.clone() {
        session.progress_mut().set_today(today);
    }

    if let Some(path) = &cli.exercise {
        let definition = ExerciseDefinition::load(path)
            .with_context(|| format!("loading exercise {}", path.display()))?;
        session.load_exercise(&definition)?;
        println!("{}", definition.title);
        if !definition.description.is_empty() {
            println!("{}", definition.description);
        }
    } else {
        session.set_target(cli.target);
    }

    let mut audio = AudioWorker::start(frame_size, TICKS_PER_SECOND)?;
    info!("[MAIN] Capturing at {} Hz", audio.sample_rate());
    let commands = spawn_command_reader();
    println!("Commands: <enter> quit, f freeze, r restart");

    session.start_listening();
    if session.exercise().is_some() {
        for event in session.start_exercise() {
            println!("{}", display::event_line(&event));
        }
    }

    run_loop(&mut session, &audio, &commands, &store, hold_secs, cli.seconds);

    session.stop_listening();
    audio.shutdown();
    session.flush_progress(&store);

    println!();
    println!("{}", display::stats_text("This session:", session.progress().session()));
    println!("{}", display::stats_text("All time:", &session.progress().all_time().stats));
    println!("{}", display::level_text(session.progress().all_time()));
    info!("[MAIN] Application finished");
    Ok(())
}

fn build_config(cli: &Cli) -> Result<TrainerConfig> {
    let mut config = match &cli.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = Some(difficulty);
    }
    if let Some(semitones) = cli.transpose {
        config.transposition_semitones = semitones;
    }
    config.validate()?;
    Ok(config)
}

/// Ticks until quit, timeout, or the end of the exercise.
fn run_loop(
    session: &mut PracticeSession,
    audio: &AudioWorker,
    commands: &Receiver<Command>,
    store: &ProgressStore,
    hold_secs: f32,
    seconds: Option<u64>,
) {
    let started = Instant::now();
    let deadline = seconds.map(|s| started + Duration::from_secs(s));

    loop {
        let tick_start = Instant::now();

        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Quit => return,
                Command::Freeze => {
                    let frozen = session.toggle_freeze();
                    println!("\n{}", if frozen { "Frozen" } else { "Resumed" });
                }
                Command::Restart => {
                    session.restart_exercise();
                    if session.exercise().is_some() {
                        for event in session.start_exercise() {
                            println!("\n{}", display::event_line(&event));
                        }
                    }
                }
            }
        }

        if let Some(frame) = audio.latest_frame() {
            let report = session.tick(&frame, tick_start);
            print!("\r{:<90}", display::status_line(&report, hold_secs));
            let _ = io::stdout().flush();

            for event in &report.events {
                println!("\n{}", display::event_line(event));
            }
            if report.phase == Some(ExercisePhase::Finished) {
                return;
            }
        }

        session.maybe_flush_progress(store, tick_start);

        if deadline.is_some_and(|d| tick_start >= d) {
            return;
        }
        if let Some(rest) = TICK.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

/// Reads stdin on its own thread; an empty line or `q` quits. A closed
/// stdin leaves the loop to `--seconds` or the end of the exercise.
fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let command = match line.as_deref().map(str::trim) {
                Ok("f") => Command::Freeze,
                Ok("r") => Command::Restart,
                Ok("") | Ok("q") => Command::Quit,
                Err(_) => return,
                Ok(other) => {
                    warn!("[MAIN] Unknown command `{}`", other);
                    continue;
                }
            };
            if tx.send(command).is_err() || command == Command::Quit {
                return;
            }
        }
    });
    rx
}
