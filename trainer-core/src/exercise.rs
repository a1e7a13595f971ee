//! # Exercise State Machine
//!
//! Drives a sequential singing exercise: each target note must be held
//! in tune for the configured duration, then a short feedback pause
//! follows before the next target is announced.
//!
//! ```text
//! Idle --start--> Listening --hold complete--> Feedback --delay--> Listening
//!                                                   \--last note--> Finished
//! ```
//!
//! `restart()` returns to `Idle` from any phase.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;
use crate::error::ExerciseError;
use crate::matching::{HoldTracker, MatchState};
use crate::tuning::{Note, NoteDetails};

/// One step of an exercise as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseStep {
    pub note_name: String,
    /// Suggested length in seconds. Informational only; completion is
    /// governed by the configured hold duration.
    #[serde(default, rename = "duration")]
    pub duration_hint: Option<f32>,
}

/// An exercise as loaded from JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub notes: Vec<ExerciseStep>,
}

impl ExerciseDefinition {
    pub fn from_json(data: &str) -> Result<Self, ExerciseError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExerciseError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ExerciseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Builds a definition from plain note names, e.g. `["C4", "E4", "G4"]`.
    pub fn from_note_names<S: AsRef<str>>(title: &str, names: &[S]) -> Self {
        Self {
            title: title.to_string(),
            description: String::new(),
            notes: names
                .iter()
                .map(|n| ExerciseStep {
                    note_name: n.as_ref().to_string(),
                    duration_hint: None,
                })
                .collect(),
        }
    }

    /// Parses and transposes every step. Fails on the first bad entry
    /// instead of skipping it.
    pub fn resolve(&self, transposition: i32) -> Result<Vec<Note>, ExerciseError> {
        if self.notes.is_empty() {
            return Err(ExerciseError::Empty);
        }
        self.notes
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let note: Note =
                    step.note_name
                        .parse()
                        .map_err(|_| ExerciseError::UnknownNote {
                            index,
                            name: step.note_name.clone(),
                        })?;
                note.transpose(transposition)
                    .ok_or_else(|| ExerciseError::TransposeOutOfRange {
                        note: step.note_name.clone(),
                        semitones: transposition,
                    })
            })
            .collect()
    }
}

/// Parameters fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExerciseSettings {
    pub cent_tolerance: f32,
    pub hold_duration: Duration,
    pub transposition: i32,
    pub feedback_delay: Duration,
}

impl Default for ExerciseSettings {
    fn default() -> Self {
        Self::from_config(&TrainerConfig::default())
    }
}

impl ExerciseSettings {
    pub fn from_config(config: &TrainerConfig) -> Self {
        Self {
            cent_tolerance: config.effective_tolerance(),
            hold_duration: config.hold_duration(),
            transposition: config.transposition_semitones,
            feedback_delay: config.feedback_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExercisePhase {
    Idle,
    Listening,
    Feedback,
    Finished,
}

/// Cents recorded at the moment a note was completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteScore {
    pub note: Note,
    pub cents: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseSummary {
    pub average_abs_cents: f32,
    /// Completed note with the largest |cents|; the earliest wins ties.
    pub worst: Option<NoteScore>,
    pub scores: Vec<NoteScore>,
}

impl ExerciseSummary {
    pub fn from_scores(scores: &[NoteScore]) -> Self {
        let average_abs_cents = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|s| s.cents.abs()).sum::<f32>() / scores.len() as f32
        };
        let worst = scores.iter().fold(None::<NoteScore>, |worst, s| match worst {
            Some(w) if w.cents.abs() >= s.cents.abs() => Some(w),
            _ => Some(*s),
        });
        Self {
            average_abs_cents,
            worst,
            scores: scores.to_vec(),
        }
    }
}

/// Side effects requested by the machine. The host decides how to play
/// tones or show results.
#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseEvent {
    /// A new target is active; play its reference tone.
    ReferenceTone(Note),
    NoteCompleted(NoteScore),
    Finished(ExerciseSummary),
}

/// The mutable part of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseRun {
    pub notes: Vec<Note>,
    pub current_index: usize,
    pub scores: Vec<NoteScore>,
}

#[derive(Debug, Clone)]
pub struct ExerciseMachine {
    title: String,
    settings: ExerciseSettings,
    run: ExerciseRun,
    phase: ExercisePhase,
    hold: HoldTracker,
    feedback_since: Option<Instant>,
}

impl ExerciseMachine {
    /// Validates the definition and prepares an idle run. Transposition
    /// is applied here, once, before any matching happens.
    pub fn new(definition: &ExerciseDefinition, settings: ExerciseSettings) -> Result<Self, ExerciseError> {
        let notes = definition.resolve(settings.transposition)?;
        Ok(Self {
            title: definition.title.clone(),
            settings,
            run: ExerciseRun {
                notes,
                current_index: 0,
                scores: Vec::new(),
            },
            phase: ExercisePhase::Idle,
            hold: HoldTracker::new(settings.cent_tolerance),
            feedback_since: None,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn settings(&self) -> &ExerciseSettings {
        &self.settings
    }

    pub fn phase(&self) -> ExercisePhase {
        self.phase
    }

    pub fn run(&self) -> &ExerciseRun {
        &self.run
    }

    pub fn match_state(&self) -> MatchState {
        self.hold.state()
    }

    /// The note being asked for, while a run is in progress.
    pub fn target(&self) -> Option<Note> {
        match self.phase {
            ExercisePhase::Listening | ExercisePhase::Feedback => {
                self.run.notes.get(self.run.current_index).copied()
            }
            ExercisePhase::Idle | ExercisePhase::Finished => None,
        }
    }

    pub fn summary(&self) -> Option<ExerciseSummary> {
        (self.phase == ExercisePhase::Finished).then(|| ExerciseSummary::from_scores(&self.run.scores))
    }

    /// Starts the run. Does nothing unless the machine is idle.
    pub fn start(&mut self) -> Vec<ExerciseEvent> {
        if self.phase != ExercisePhase::Idle {
            return Vec::new();
        }
        self.run.current_index = 0;
        self.run.scores.clear();
        self.hold.reset();
        self.phase = ExercisePhase::Listening;
        info!("[EXERCISE] Started `{}` with {} notes", self.title, self.run.notes.len());
        vec![ExerciseEvent::ReferenceTone(self.run.notes[0])]
    }

    /// Back to `Idle` with an empty score sheet.
    pub fn restart(&mut self) {
        self.run.current_index = 0;
        self.run.scores.clear();
        self.hold.reset();
        self.feedback_since = None;
        self.phase = ExercisePhase::Idle;
        debug!("[EXERCISE] Reset to idle");
    }

    /// Feeds one frame. `details` is the raw per-frame mapping (after
    /// the attack gate), not the smoothed stream.
    pub fn update(&mut self, details: Option<&NoteDetails>, now: Instant) -> Vec<ExerciseEvent> {
        match self.phase {
            ExercisePhase::Listening => self.listen(details, now),
            ExercisePhase::Feedback => self.finish_feedback(now),
            ExercisePhase::Idle | ExercisePhase::Finished => Vec::new(),
        }
    }

    fn listen(&mut self, details: Option<&NoteDetails>, now: Instant) -> Vec<ExerciseEvent> {
        let target = self.run.notes[self.run.current_index];
        let state = self.hold.update(details, &target, now);

        if !state.is_on_pitch || state.elapsed_hold < self.settings.hold_duration {
            return Vec::new();
        }

        // `is_on_pitch` implies details were present.
        let cents = details.map(|d| d.cents).unwrap_or_default();
        let score = NoteScore { note: target, cents };
        self.run.scores.push(score);
        self.hold.reset();
        self.phase = ExercisePhase::Feedback;
        self.feedback_since = Some(now);
        debug!("[EXERCISE] Completed {} at {:+.1} cents", target, cents);
        vec![ExerciseEvent::NoteCompleted(score)]
    }

    fn finish_feedback(&mut self, now: Instant) -> Vec<ExerciseEvent> {
        let since = *self.feedback_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.settings.feedback_delay {
            return Vec::new();
        }
        self.feedback_since = None;
        self.run.current_index += 1;

        if self.run.current_index >= self.run.notes.len() {
            self.phase = ExercisePhase::Finished;
            let summary = ExerciseSummary::from_scores(&self.run.scores);
            info!(
                "[EXERCISE] Finished `{}`: average ±{:.1} cents",
                self.title, summary.average_abs_cents
            );
            vec![ExerciseEvent::Finished(summary)]
        } else {
            self.phase = ExercisePhase::Listening;
            let next = self.run.notes[self.run.current_index];
            debug!("[EXERCISE] Next target {}", next);
            vec![ExerciseEvent::ReferenceTone(next)]
        }
    }
}
