//! # Frame Energy Gate
//!
//! Rejects near-silent frames before the expensive periodicity pass.
//! YIN on a nearly silent buffer produces low-confidence pitches that
//! flicker on screen, so anything at or below the threshold is skipped.

/// Root-mean-square amplitude of a block of samples.
///
/// Returns 0.0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Amplitude gate with an exclusive threshold: a frame passes only when
/// its RMS is strictly greater than `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyGate {
    threshold: f32,
}

impl EnergyGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_open(&self, samples: &[f32]) -> bool {
        rms(samples) > self.threshold
    }
}
