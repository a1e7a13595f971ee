#![allow(dead_code)]

use std::f32::consts::PI;
use std::time::{Duration, Instant};

use trainer_core::tuning::{note_frequency, Note, NoteDetails};
use trainer_core::AudioFrame;

pub const SAMPLE_RATE: u32 = 44100;

/// One display tick at 60 fps, rounded up to whole microseconds.
pub const FRAME: Duration = Duration::from_micros(16_667);

pub fn at(t0: Instant, frame: u32) -> Instant {
    t0 + FRAME * frame
}

pub fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

pub fn note(name: &str) -> Note {
    name.parse().expect("valid note name")
}

pub fn tone_frame(note: Note, len: usize) -> AudioFrame {
    AudioFrame::new(sine(note.frequency(), 0.4, SAMPLE_RATE, len), SAMPLE_RATE)
}

pub fn silent_frame(len: usize) -> AudioFrame {
    AudioFrame::new(vec![0.0; len], SAMPLE_RATE)
}

/// Mapping of a note sung `cents` off pitch.
pub fn sung(note: Note, cents: f64) -> NoteDetails {
    let f = note_frequency(note.note_number()) as f64 * 2f64.powf(cents / 1200.0);
    NoteDetails::from_frequency(f as f32).expect("positive frequency")
}
