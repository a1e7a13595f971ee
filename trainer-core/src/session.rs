//! # Practice Session
//!
//! Owns every piece of per-singer state and runs the full analysis
//! pipeline once per tick:
//!
//! ```text
//! frame -> energy gate -> YIN -> attack gate -> note mapper -+-> smoother (display)
//!                                                            +-> matcher (scoring) -> exercise / progress
//! ```
//!
//! ## Features
//! - Free play with or without a target note, or a sequential exercise
//! - Listening can be stopped from any state; history and holds reset cleanly
//! - Freeze keeps the last report on screen without analysing
//! - Periodic, non-blocking progress flushing

use std::time::Instant;

use log::{debug, info, warn};

use crate::config::TrainerConfig;
use crate::error::{ConfigError, ExerciseError};
use crate::exercise::{
    ExerciseDefinition, ExerciseEvent, ExerciseMachine, ExercisePhase, ExerciseSettings,
};
use crate::gate::EnergyGate;
use crate::matching::{HoldTracker, MatchState};
use crate::pitch::{PeriodicityEstimator, Yin};
use crate::progress::{InTuneFrame, LifetimeProgress, ProgressTracker};
use crate::smoothing::{AttackGate, PitchHistory};
use crate::storage::{FlushTimer, ProgressStore};
use crate::tuning::{classify, Note, NoteDetails, PitchFeedback};
use crate::AudioFrame;

/// What the session is practising.
#[derive(Debug, Clone)]
pub enum PracticeMode {
    /// No progression. With a target, holds are tracked against it;
    /// without one, any detected pitch within tolerance of its own
    /// nearest note counts as in tune.
    FreePlay {
        target: Option<Note>,
        hold: HoldTracker,
    },
    Exercise(ExerciseMachine),
}

/// Everything a host needs to draw one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Per-frame estimate, already passed through the attack gate.
    pub frequency: Option<f32>,
    /// Per-frame mapping of `frequency`; this is what scoring uses.
    pub details: Option<NoteDetails>,
    pub smoothed_frequency: Option<f32>,
    pub match_state: MatchState,
    pub target: Option<Note>,
    pub feedback: Option<PitchFeedback>,
    pub events: Vec<ExerciseEvent>,
    /// `None` in free play.
    pub phase: Option<ExercisePhase>,
    /// False when the tick was skipped (not listening, or frozen).
    pub analysed: bool,
}

impl TickReport {
    /// Mapping of the smoothed frequency, for the note readout.
    pub fn smoothed_details(&self) -> Option<NoteDetails> {
        self.smoothed_frequency.and_then(NoteDetails::from_frequency)
    }
}

pub struct PracticeSession {
    config: TrainerConfig,
    gate: EnergyGate,
    estimator: Box<dyn PeriodicityEstimator + Send>,
    history: PitchHistory,
    attack: AttackGate,
    mode: PracticeMode,
    progress: ProgressTracker,
    flush_timer: FlushTimer,
    listening: bool,
    frozen: bool,
    last_report: TickReport,
}

impl PracticeSession {
    /// Creates an idle, non-listening session in free play with the
    /// YIN estimator.
    pub fn new(config: TrainerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let estimator = Box::new(Yin::from_config(&config));
        Ok(Self::with_estimator(config, estimator))
    }

    /// Same as `new` but with a caller-supplied estimator. The config is
    /// assumed valid.
    pub fn with_estimator(config: TrainerConfig, estimator: Box<dyn PeriodicityEstimator + Send>) -> Self {
        let tolerance = config.effective_tolerance();
        Self {
            gate: EnergyGate::new(config.energy_gate_threshold),
            estimator,
            history: PitchHistory::new(config.pitch_history_capacity, config.smoothing_window_size),
            attack: AttackGate::new(config.attack_ignore_frames),
            mode: PracticeMode::FreePlay {
                target: None,
                hold: HoldTracker::new(tolerance),
            },
            progress: ProgressTracker::new(LifetimeProgress::default(), config.intonation_window),
            flush_timer: FlushTimer::new(config.progress_flush_interval()),
            listening: false,
            frozen: false,
            last_report: TickReport::default(),
            config,
        }
    }

    /// Replaces the lifetime accumulator with previously saved progress.
    pub fn with_progress(mut self, all_time: LifetimeProgress) -> Self {
        self.progress = ProgressTracker::new(all_time, self.config.intonation_window);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn history(&self) -> &PitchHistory {
        &self.history
    }

    pub fn mode(&self) -> &PracticeMode {
        &self.mode
    }

    pub fn exercise(&self) -> Option<&ExerciseMachine> {
        match &self.mode {
            PracticeMode::Exercise(machine) => Some(machine),
            PracticeMode::FreePlay { .. } => None,
        }
    }

    /// The note currently asked for, from either mode.
    pub fn target(&self) -> Option<Note> {
        match &self.mode {
            PracticeMode::FreePlay { target, .. } => *target,
            PracticeMode::Exercise(machine) => machine.target(),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressTracker {
        &mut self.progress
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    pub fn start_listening(&mut self) {
        if !self.listening {
            self.listening = true;
            info!("[SESSION] Listening started");
        }
    }

    /// Stops analysis. Safe from any state: the open streak is
    /// committed, history and holds are cleared, and an unfinished
    /// exercise goes back to idle.
    pub fn stop_listening(&mut self) {
        self.listening = false;
        self.frozen = false;
        self.progress.close_streak();
        self.history.clear();
        self.attack.reset();
        match &mut self.mode {
            PracticeMode::FreePlay { hold, .. } => hold.reset(),
            PracticeMode::Exercise(machine) => {
                if machine.phase() != ExercisePhase::Finished {
                    machine.restart();
                }
            }
        }
        self.last_report = TickReport::default();
        info!("[SESSION] Listening stopped");
    }

    /// Switches to free play with the given target (or none). Any loaded
    /// exercise is dropped.
    pub fn set_target(&mut self, target: Option<Note>) {
        self.progress.close_streak();
        self.mode = PracticeMode::FreePlay {
            target,
            hold: HoldTracker::new(self.config.effective_tolerance()),
        };
        match target {
            Some(note) => info!("[SESSION] Target set to {}", note),
            None => info!("[SESSION] Target cleared"),
        }
    }

    /// Validates and installs an exercise, idle until `start_exercise`.
    pub fn load_exercise(&mut self, definition: &ExerciseDefinition) -> Result<(), ExerciseError> {
        let machine = ExerciseMachine::new(definition, ExerciseSettings::from_config(&self.config))?;
        self.progress.close_streak();
        info!(
            "[SESSION] Loaded exercise `{}` ({} notes)",
            machine.title(),
            machine.run().notes.len()
        );
        self.mode = PracticeMode::Exercise(machine);
        Ok(())
    }

    /// Starts the loaded exercise. Returns the first reference tone.
    pub fn start_exercise(&mut self) -> Vec<ExerciseEvent> {
        match &mut self.mode {
            PracticeMode::Exercise(machine) => machine.start(),
            PracticeMode::FreePlay { .. } => {
                warn!("[SESSION] start_exercise called without a loaded exercise");
                Vec::new()
            }
        }
    }

    pub fn restart_exercise(&mut self) {
        if let PracticeMode::Exercise(machine) = &mut self.mode {
            machine.restart();
        }
    }

    /// Returns the new frozen state.
    pub fn toggle_freeze(&mut self) -> bool {
        self.frozen = !self.frozen;
        debug!("[SESSION] Frozen: {}", self.frozen);
        self.frozen
    }

    /// Runs one pipeline pass.
    ///
    /// When not listening or frozen, no analysis happens and the last
    /// report is returned without events.
    ///
    /// # Arguments
    /// * `frame` - The newest audio frame
    /// * `now` - Tick timestamp; all hold and delay timing uses it
    pub fn tick(&mut self, frame: &AudioFrame, now: Instant) -> TickReport {
        if !self.listening || self.frozen {
            return self.skipped_report();
        }

        let estimate = if self.gate.is_open(&frame.samples) {
            self.estimator.estimate(&frame.samples, frame.sample_rate_hz)
        } else {
            None
        };
        let frequency = self.attack.filter(estimate);
        self.history.push(frequency);

        let details = frequency.and_then(NoteDetails::from_frequency);
        let tolerance = self.config.effective_tolerance();

        let (match_state, target, events, phase, in_tune) = match &mut self.mode {
            PracticeMode::FreePlay { target: Some(target), hold } => {
                let state = hold.update(details.as_ref(), target, now);
                let in_tune = in_tune_frame(state.is_on_pitch, details.as_ref(), Some(*target));
                (state, Some(*target), Vec::new(), None, in_tune)
            }
            PracticeMode::FreePlay { target: None, .. } => {
                let on_own_note = details.is_some_and(|d| d.cents.abs() <= tolerance);
                let in_tune = in_tune_frame(on_own_note, details.as_ref(), None);
                (MatchState::default(), None, Vec::new(), None, in_tune)
            }
            PracticeMode::Exercise(machine) => {
                let target = machine.target();
                let events = machine.update(details.as_ref(), now);
                let state = machine.match_state();
                let in_tune = in_tune_frame(state.is_on_pitch, details.as_ref(), target);
                (state, target, events, Some(machine.phase()), in_tune)
            }
        };

        self.progress.observe(now, in_tune);

        let report = TickReport {
            frequency,
            details,
            smoothed_frequency: self.history.current_smoothed(),
            match_state,
            target,
            feedback: details.zip(target).map(|(d, t)| classify(&d, &t)),
            events,
            phase,
            analysed: true,
        };
        self.last_report = report.clone();
        report
    }

    /// Writes lifetime progress if it changed. Failures are logged and
    /// retried on the next flush; they never interrupt analysis.
    ///
    /// # Returns
    /// * `true` if a save happened and succeeded
    pub fn flush_progress(&mut self, store: &ProgressStore) -> bool {
        if !self.progress.take_dirty() {
            return false;
        }
        match store.save(self.progress.all_time()) {
            Ok(()) => true,
            Err(e) => {
                warn!("[SESSION] Could not save progress: {}", e);
                self.progress.mark_dirty();
                false
            }
        }
    }

    /// `flush_progress`, but only when the flush interval has elapsed.
    pub fn maybe_flush_progress(&mut self, store: &ProgressStore, now: Instant) -> bool {
        self.flush_timer.due(now) && self.flush_progress(store)
    }

    fn skipped_report(&self) -> TickReport {
        TickReport {
            events: Vec::new(),
            analysed: false,
            ..self.last_report.clone()
        }
    }
}

/// Labels an in-tune frame with the target when there is one, otherwise
/// with the detected note.
fn in_tune_frame(in_tune: bool, details: Option<&NoteDetails>, target: Option<Note>) -> Option<InTuneFrame> {
    let details = details.filter(|_| in_tune)?;
    let note = target.unwrap_or_else(|| details.note());
    Some(InTuneFrame {
        note: note.to_string(),
        abs_cents: details.cents.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::sine;
    use crate::tuning::note_frequency;
    use std::time::Duration;

    const RATE: u32 = 44100;

    fn quiet_config() -> TrainerConfig {
        TrainerConfig {
            attack_ignore_frames: 0,
            ..TrainerConfig::default()
        }
    }

    fn tone(note: &str) -> AudioFrame {
        let n: Note = note.parse().unwrap();
        AudioFrame::new(sine(note_frequency(n.note_number()), 0.5, RATE, 2048), RATE)
    }

    fn silence() -> AudioFrame {
        AudioFrame::new(vec![0.0; 2048], RATE)
    }

    fn frame_time(t0: Instant, i: usize) -> Instant {
        t0 + Duration::from_secs_f64(i as f64 / 60.0)
    }

    #[test]
    fn not_listening_skips_analysis() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        let report = session.tick(&tone("A4"), Instant::now());
        assert!(!report.analysed);
        assert!(session.history().is_empty());
    }

    #[test]
    fn free_play_reports_detected_note() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.start_listening();
        let report = session.tick(&tone("A4"), Instant::now());
        let details = report.details.unwrap();
        assert_eq!(details.note().to_string(), "A4");
        assert!(details.cents.abs() < 10.0);
        assert_eq!(report.feedback, None);
        assert_eq!(report.phase, None);
    }

    #[test]
    fn silence_is_no_pitch() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.start_listening();
        let report = session.tick(&silence(), Instant::now());
        assert!(report.analysed);
        assert_eq!(report.frequency, None);
        assert_eq!(report.smoothed_frequency, None);
    }

    #[test]
    fn attack_frames_are_hidden() {
        let config = TrainerConfig {
            attack_ignore_frames: 3,
            ..TrainerConfig::default()
        };
        let mut session = PracticeSession::new(config).unwrap();
        session.start_listening();
        let t0 = Instant::now();
        let detected: Vec<bool> = (0..5)
            .map(|i| session.tick(&tone("E4"), frame_time(t0, i)).details.is_some())
            .collect();
        assert_eq!(detected, vec![false, false, false, true, true]);
    }

    #[test]
    fn octave_miss_is_classified() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.set_target(Some("A3".parse().unwrap()));
        session.start_listening();
        let report = session.tick(&tone("A4"), Instant::now());
        assert_eq!(report.feedback, Some(PitchFeedback::OctaveMiss));
        assert!(!report.match_state.is_on_pitch);
    }

    #[test]
    fn freeze_keeps_last_report() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.start_listening();
        let t0 = Instant::now();
        let first = session.tick(&tone("C4"), t0);
        assert!(session.toggle_freeze());
        let frozen = session.tick(&tone("G4"), frame_time(t0, 1));
        assert!(!frozen.analysed);
        assert_eq!(frozen.details, first.details);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn stop_listening_resets_an_unfinished_exercise() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        let def = ExerciseDefinition::from_note_names("two", &["C4", "E4"]);
        session.load_exercise(&def).unwrap();
        session.start_exercise();
        session.start_listening();
        session.tick(&tone("C4"), Instant::now());
        session.stop_listening();

        let machine = session.exercise().unwrap();
        assert_eq!(machine.phase(), ExercisePhase::Idle);
        assert!(session.history().is_empty());
        assert!(!session.is_listening());
        // Stopping twice is harmless.
        session.stop_listening();
    }

    #[test]
    fn free_play_progress_is_labelled_by_target() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.set_target(Some("C4".parse().unwrap()));
        session.start_listening();
        let t0 = Instant::now();
        for i in 0..=30 {
            session.tick(&tone("C4"), frame_time(t0, i));
        }
        session.tick(&silence(), frame_time(t0, 31));

        let stats = session.progress().session();
        let seconds = stats.note_seconds["C4"];
        assert!((seconds - 0.5).abs() < 1e-6);
    }

    #[test]
    fn free_play_without_target_credits_the_sung_note() {
        let mut session = PracticeSession::new(quiet_config()).unwrap();
        session.start_listening();
        let t0 = Instant::now();
        for i in 0..=60 {
            let report = session.tick(&tone("A4"), frame_time(t0, i));
            assert_eq!(report.target, None);
        }
        session.tick(&silence(), frame_time(t0, 61));

        let stats = session.progress().session();
        assert_eq!(stats.note_seconds.len(), 1);
        assert!((stats.note_seconds["A4"] - 1.0).abs() < 1e-3);
        let hold = stats.longest_hold.as_ref().unwrap();
        assert_eq!(hold.note, "A4");
        assert!((hold.seconds - 1.0).abs() < 1e-3);
    }

    #[test]
    fn flush_only_when_dirty() {
        let path = std::env::temp_dir().join("vocal_trainer_session_flush.json");
        let _ = std::fs::remove_file(&path);
        let store = ProgressStore::new(&path, "tester");

        let mut session = PracticeSession::new(quiet_config()).unwrap();
        assert!(!session.flush_progress(&store));

        session.start_listening();
        let t0 = Instant::now();
        session.tick(&tone("D4"), t0);
        session.tick(&tone("D4"), frame_time(t0, 60));
        session.stop_listening();

        assert!(session.flush_progress(&store));
        assert_eq!(store.load().unwrap().stats.note_seconds.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrainerConfig {
            smoothing_window_size: 0,
            ..TrainerConfig::default()
        };
        assert!(PracticeSession::new(config).is_err());
    }
}
