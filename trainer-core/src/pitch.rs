//! # Pitch Detection Module
//!
//! Estimates the fundamental frequency of a single monophonic frame.
//! The estimator is the YIN difference-function method with parabolic
//! interpolation; it is the dominant per-tick cost of the pipeline
//! (O(W²) for a lag window of W = frame / 2).
//!
//! ## Features
//! - Cumulative mean normalized difference with a divide-by-zero guard
//! - "First dip" threshold search to avoid octave-up errors
//! - Global-minimum fallback so a usable lag is always found
//! - Parabolic interpolation for sub-sample lag accuracy
//! - Plausible-range rejection (50 Hz to 3 kHz by default)

use crate::config::TrainerConfig;

/// Smallest lag examined. Lags below this would mean frequencies far
/// above any voice at common sample rates.
const MIN_TAU: usize = 4;

/// A strategy that turns one time-domain frame into a frequency.
///
/// `None` means "no discernible pitch in this frame" and is a normal
/// outcome for silence, noise and out-of-range results.
pub trait PeriodicityEstimator {
    fn estimate(&mut self, samples: &[f32], sample_rate_hz: u32) -> Option<f32>;
}

/// YIN estimator with a reusable scratch buffer.
#[derive(Debug, Clone)]
pub struct Yin {
    threshold: f32,
    min_frequency_hz: f32,
    max_frequency_hz: f32,
    yin_buffer: Vec<f32>,
}

impl Yin {
    /// Creates an estimator.
    ///
    /// # Arguments
    /// * `threshold` - Absolute threshold for the first-dip search (0.12 is a good default)
    /// * `min_frequency_hz` - Lowest accepted result, inclusive
    /// * `max_frequency_hz` - Highest accepted result, inclusive
    pub fn new(threshold: f32, min_frequency_hz: f32, max_frequency_hz: f32) -> Self {
        Self {
            threshold,
            min_frequency_hz,
            max_frequency_hz,
            yin_buffer: Vec::new(),
        }
    }

    pub fn from_config(config: &TrainerConfig) -> Self {
        Self::new(
            config.yin_threshold,
            config.min_frequency_hz,
            config.max_frequency_hz,
        )
    }

    /// Fills `yin_buffer` with the cumulative mean normalized difference
    /// of `signal`. Returns `false` when the frame is constant, in which
    /// case there is no period to find.
    fn compute_cmnd(&mut self, signal: &[f32], half: usize) -> bool {
        self.yin_buffer.clear();
        self.yin_buffer.resize(half, 0.0);

        // --- Step 1 & 2: Difference function and squared difference ---
        for tau in 1..half {
            let mut diff = 0.0;
            for i in 0..half {
                let delta = signal[i] - signal[i + tau];
                diff += delta * delta;
            }
            self.yin_buffer[tau] = diff;
        }

        if self.yin_buffer[1..].iter().all(|&d| d == 0.0) {
            return false;
        }

        // --- Step 3: Cumulative mean normalized difference ---
        let mut running_sum = 0.0;
        self.yin_buffer[0] = 1.0;
        for tau in 1..half {
            running_sum += self.yin_buffer[tau];
            let divisor = if running_sum != 0.0 { running_sum } else { 1.0 };
            self.yin_buffer[tau] *= tau as f32 / divisor;
        }
        true
    }

    /// Step 4 & 5: the first local minimum under the threshold, or the
    /// global minimum when nothing clears it.
    fn select_lag(&self) -> usize {
        let buf = &self.yin_buffer;
        let half = buf.len();

        let first_dip = (MIN_TAU..half - 1)
            .find(|&tau| buf[tau] < self.threshold && buf[tau] < buf[tau - 1] && buf[tau] < buf[tau + 1]);

        first_dip.unwrap_or_else(|| {
            let mut best = MIN_TAU;
            for tau in MIN_TAU..half {
                if buf[tau] < buf[best] {
                    best = tau;
                }
            }
            best
        })
    }

    /// Step 6: parabolic interpolation around `tau`. Falls back to the
    /// integer lag at the buffer edge or when the parabola is flat.
    fn refine_lag(&self, tau: usize) -> f32 {
        if tau + 1 >= self.yin_buffer.len() {
            return tau as f32;
        }
        let y1 = self.yin_buffer[tau - 1];
        let y2 = self.yin_buffer[tau];
        let y3 = self.yin_buffer[tau + 1];

        let denominator = 2.0 * (2.0 * y2 - y3 - y1);
        if denominator == 0.0 {
            return tau as f32;
        }
        let refined = tau as f32 + (y3 - y1) / denominator;
        if refined.is_finite() && refined > 0.0 {
            refined
        } else {
            tau as f32
        }
    }
}

impl PeriodicityEstimator for Yin {
    /// # Arguments
    /// * `samples` - One analysis frame; lags up to half its length are examined
    /// * `sample_rate_hz` - Sample rate of the frame
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected frequency in Hz, inside the configured range
    /// * `None` - Silence, a constant frame, or an implausible result
    fn estimate(&mut self, samples: &[f32], sample_rate_hz: u32) -> Option<f32> {
        let half = samples.len() / 2;
        if half < MIN_TAU + 2 || sample_rate_hz == 0 {
            return None;
        }

        if !self.compute_cmnd(samples, half) {
            return None;
        }

        let tau = self.select_lag();
        let period = self.refine_lag(tau);

        // --- Step 7 & 8: Convert to Hz and reject implausible results ---
        let frequency = sample_rate_hz as f32 / period;
        if frequency.is_finite()
            && frequency >= self.min_frequency_hz
            && frequency <= self.max_frequency_hz
        {
            Some(frequency)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::sine;

    fn yin() -> Yin {
        Yin::new(0.12, 50.0, 3000.0)
    }

    #[test]
    fn detects_a440() {
        let signal = sine(440.0, 0.5, 44100, 2048);
        let freq = yin().estimate(&signal, 44100).expect("pitch");
        assert!((freq - 440.0).abs() < 2.0, "got {freq}");
    }

    #[test]
    fn detects_low_and_high_voices() {
        let mut estimator = yin();
        for (target, rate) in [(98.0, 44100), (196.0, 48000), (261.63, 44100), (880.0, 48000)] {
            let signal = sine(target, 0.3, rate, 2048);
            let freq = estimator.estimate(&signal, rate).expect("pitch");
            let cents = 1200.0 * (freq / target).log2();
            assert!(cents.abs() < 10.0, "{target} Hz detected as {freq} Hz");
        }
    }

    #[test]
    fn silence_returns_none_for_any_length() {
        let mut estimator = yin();
        for len in [0, 1, 2, 9, 12, 100, 1024, 2048, 4096] {
            assert_eq!(estimator.estimate(&vec![0.0; len], 44100), None);
        }
    }

    #[test]
    fn constant_frame_returns_none_even_at_low_rates() {
        // 8000 / MIN_TAU = 2000 Hz would otherwise be "in range".
        let mut estimator = yin();
        assert_eq!(estimator.estimate(&vec![0.3; 2048], 8000), None);
        assert_eq!(estimator.estimate(&vec![0.0; 2048], 8000), None);
    }

    #[test]
    fn out_of_range_result_is_rejected() {
        // 40 Hz is below the default 50 Hz floor.
        let signal = sine(40.0, 0.5, 8000, 2048);
        assert_eq!(Yin::new(0.12, 50.0, 3000.0).estimate(&signal, 8000), None);
        let accepted = Yin::new(0.12, 30.0, 3000.0).estimate(&signal, 8000);
        assert!(accepted.is_some_and(|f| (f - 40.0).abs() < 1.0));
    }

    #[test]
    fn scratch_buffer_is_reused_across_frame_sizes() {
        let mut estimator = yin();
        let long = sine(330.0, 0.5, 44100, 4096);
        let short = sine(330.0, 0.5, 44100, 1024);
        let a = estimator.estimate(&long, 44100).unwrap();
        let b = estimator.estimate(&short, 44100).unwrap();
        assert!((a - 330.0).abs() < 2.0);
        assert!((b - 330.0).abs() < 2.0);
    }
}
