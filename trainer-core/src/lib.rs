// trainer-core/src/lib.rs

//! The core logic for the vocal pitch trainer.
//! This crate is responsible for audio capture, pitch detection,
//! note mapping, smoothing and exercise scoring. It is completely
//! headless and contains no presentation code.

pub mod audio;
pub mod config;
pub mod error;
pub mod exercise;
pub mod gate;
pub mod matching;
pub mod pitch;
pub mod progress;
pub mod session;
pub mod smoothing;
pub mod storage;
pub mod tuning;

pub use config::{Difficulty, TrainerConfig};
pub use error::TrainerError;
pub use session::{PracticeSession, TickReport};
pub use tuning::{Note, NoteDetails, PitchClass};

/// A fixed-size block of mono time-domain samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Samples in the range [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate of the stream the frame was taken from, in Hz.
    pub sample_rate_hz: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }
}

/// Synthetic signals shared by the unit tests.
#[cfg(test)]
pub(crate) mod test_signals {
    use std::f32::consts::PI;

    pub fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }
}
