//! # Musical Tuning Module
//!
//! Maps frequencies onto equal-tempered note coordinates and back.
//!
//! Numbering convention used everywhere in the crate: note number 0 is
//! C0 (`440 * 2^-4.75` Hz), so C4 = 48 and A4 = 57. The mapper, the
//! exercise transposition and the continuous graph position all use it;
//! mixing it with MIDI numbering would shift every octave by one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Frequency of note number 0, `440 Hz * 2^(-4.75)`.
pub const C0_HZ: f64 = 16.351_597_831_287_414;

/// Note number of A4 in the C0 = 0 convention.
pub const A4_NOTE_NUMBER: i32 = 57;

/// The twelve pitch classes, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C.
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Pitch class of any note number (Euclidean modulo, so negative
    /// numbers wrap correctly).
    pub fn from_note_number(note_number: i32) -> Self {
        Self::ALL[note_number.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Flat spelling for the black keys.
    pub fn flat_name(self) -> Option<&'static str> {
        match self {
            PitchClass::CSharp => Some("Db"),
            PitchClass::DSharp => Some("Eb"),
            PitchClass::FSharp => Some("Gb"),
            PitchClass::GSharp => Some("Ab"),
            PitchClass::ASharp => Some("Bb"),
            _ => None,
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name lookup for parsing, covering sharp and flat spellings.
static PITCH_CLASS_MAP: Lazy<BTreeMap<&'static str, PitchClass>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for pc in PitchClass::ALL {
        map.insert(pc.name(), pc);
        if let Some(flat) = pc.flat_name() {
            map.insert(flat, pc);
        }
    }
    map
});

impl FromStr for PitchClass {
    type Err = ParseNoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PITCH_CLASS_MAP
            .get(s)
            .copied()
            .ok_or_else(|| ParseNoteError(s.to_string()))
    }
}

/// A note name that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNoteError(pub String);

impl fmt::Display for ParseNoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown note name `{}`", self.0)
    }
}

impl std::error::Error for ParseNoteError {}

/// A concrete pitch: pitch class plus octave, e.g. `C#4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self {
            pitch_class,
            octave,
        }
    }

    pub fn from_note_number(note_number: i32) -> Self {
        Self {
            pitch_class: PitchClass::from_note_number(note_number),
            octave: note_number.div_euclid(12),
        }
    }

    /// Semitones above C0.
    pub fn note_number(&self) -> i32 {
        self.octave * 12 + self.pitch_class.index()
    }

    /// Equal-tempered frequency of this note.
    pub fn frequency(&self) -> f32 {
        note_frequency(self.note_number())
    }

    /// Shifts the note by `semitones`. Returns `None` when the result
    /// would fall below C0.
    pub fn transpose(&self, semitones: i32) -> Option<Note> {
        let shifted = self.note_number().checked_add(semitones)?;
        (shifted >= 0).then(|| Note::from_note_number(shifted))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl FromStr for Note {
    type Err = ParseNoteError;

    /// Parses names like `A4`, `C#3`, `Bb2` or `G10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| ParseNoteError(s.to_string()))?;
        let (name, octave) = s.split_at(split);
        let pitch_class = name
            .parse::<PitchClass>()
            .map_err(|_| ParseNoteError(s.to_string()))?;
        let octave = octave
            .parse::<i32>()
            .ok()
            .filter(|o| *o <= 10)
            .ok_or_else(|| ParseNoteError(s.to_string()))?;
        Ok(Note::new(pitch_class, octave))
    }
}

impl Serialize for Note {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Note {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Everything the display and the matcher need to know about one
/// detected frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteDetails {
    pub frequency: f32,
    pub pitch_class: PitchClass,
    pub octave: i32,
    /// Nearest equal-tempered semitone, C0 = 0.
    pub note_number: i32,
    /// Signed deviation from the nearest semitone. Nominally in
    /// (-50, 50]; not clamped here.
    pub cents: f32,
}

impl NoteDetails {
    /// Maps a frequency in Hz onto note coordinates.
    ///
    /// Returns `None` for non-positive or non-finite input.
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        if !(frequency > 0.0) || !frequency.is_finite() {
            return None;
        }
        let note_number = semitone_position(frequency).round() as i32;

        Some(Self {
            frequency,
            pitch_class: PitchClass::from_note_number(note_number),
            octave: note_number.div_euclid(12),
            note_number,
            cents: calculate_cents_deviation(frequency, note_frequency(note_number)),
        })
    }

    pub fn note(&self) -> Note {
        Note::new(self.pitch_class, self.octave)
    }

    /// Cents clamped to the ±50 display range of a tuner needle.
    pub fn display_cents(&self) -> f32 {
        self.cents.clamp(-50.0, 50.0)
    }
}

/// Continuous note number of a frequency (C0 = 0.0). Used for graph
/// positions; `NoteDetails::note_number` is its rounded value.
pub fn semitone_position(frequency: f32) -> f64 {
    12.0 * (frequency as f64 / C0_HZ).log2()
}

/// Equal-tempered frequency of a note number.
pub fn note_frequency(note_number: i32) -> f32 {
    (C0_HZ * 2f64.powf(note_number as f64 / 12.0)) as f32
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    (1200.0 * (freq as f64 / target_freq as f64).log2()) as f32
}

/// How the sung note relates to the target, for colouring the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchFeedback {
    /// Same pitch class and octave.
    Correct,
    /// Right pitch class, wrong octave.
    OctaveMiss,
    Wrong,
}

pub fn classify(details: &NoteDetails, target: &Note) -> PitchFeedback {
    if details.note() == *target {
        PitchFeedback::Correct
    } else if details.pitch_class == target.pitch_class {
        PitchFeedback::OctaveMiss
    } else {
        PitchFeedback::Wrong
    }
}
