//! # Trainer Configuration
//!
//! All tunable parameters of the pipeline in one serde-friendly struct.
//! Every field has a default, so a config file only needs to list the
//! values it overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Cent tolerance presets for exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn cent_tolerance(self) -> f32 {
        match self {
            Difficulty::Easy => 50.0,
            Difficulty::Normal => 30.0,
            Difficulty::Hard => 10.0,
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ConfigError::Invalid {
                field: "difficulty",
                reason: format!("expected easy, normal or hard, got `{other}`"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Maximum |cents| for a frame to count as on pitch.
    pub cent_tolerance: f32,
    /// Contiguous hold required to complete an exercise note.
    pub required_hold_secs: f32,
    /// Uniform shift applied to every exercise note before a run starts.
    pub transposition_semitones: i32,
    /// Frames at or below this RMS are treated as silence.
    pub energy_gate_threshold: f32,
    pub pitch_history_capacity: usize,
    pub smoothing_window_size: usize,
    /// Frames suppressed after each silence-to-sound transition.
    pub attack_ignore_frames: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// YIN absolute threshold for the first-dip search.
    pub yin_threshold: f32,
    /// Samples per analysis frame; YIN examines lags up to half of it.
    pub frame_size: usize,
    /// Pause between a completed note and the next target.
    pub feedback_delay_ms: u64,
    /// In-tune frames averaged for the best-intonation record.
    pub intonation_window: usize,
    pub progress_flush_secs: u64,
    /// Overrides `cent_tolerance` when set.
    pub difficulty: Option<Difficulty>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            cent_tolerance: 30.0,
            required_hold_secs: 1.0,
            transposition_semitones: 0,
            energy_gate_threshold: 0.01,
            pitch_history_capacity: 400,
            smoothing_window_size: 5,
            attack_ignore_frames: 10,
            min_frequency_hz: 50.0,
            max_frequency_hz: 3000.0,
            yin_threshold: 0.12,
            frame_size: 2048,
            feedback_delay_ms: 1000,
            intonation_window: 60,
            progress_flush_secs: 5,
            difficulty: None,
        }
    }
}

impl TrainerConfig {
    /// Reads a JSON config file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: TrainerConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// The tolerance actually used for matching: the difficulty preset
    /// wins over the raw value.
    pub fn effective_tolerance(&self) -> f32 {
        self.difficulty
            .map(Difficulty::cent_tolerance)
            .unwrap_or(self.cent_tolerance)
    }

    /// Saturates for values `validate` would reject.
    pub fn hold_duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.required_hold_secs).unwrap_or(Duration::MAX)
    }

    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }

    pub fn progress_flush_interval(&self) -> Duration {
        Duration::from_secs(self.progress_flush_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if !(self.cent_tolerance > 0.0) {
            return Err(invalid("cent_tolerance", "must be positive"));
        }
        if !(self.required_hold_secs > 0.0)
            || Duration::try_from_secs_f32(self.required_hold_secs).is_err()
        {
            return Err(invalid("required_hold_secs", "must be a positive number of seconds"));
        }
        if !(self.energy_gate_threshold >= 0.0) {
            return Err(invalid("energy_gate_threshold", "must not be negative"));
        }
        if self.pitch_history_capacity == 0 {
            return Err(invalid("pitch_history_capacity", "must be at least 1"));
        }
        if self.smoothing_window_size == 0 {
            return Err(invalid("smoothing_window_size", "must be at least 1"));
        }
        if !(self.min_frequency_hz > 0.0) || !(self.min_frequency_hz < self.max_frequency_hz) {
            return Err(invalid(
                "min_frequency_hz",
                format!(
                    "need 0 < min < max, got {} and {}",
                    self.min_frequency_hz, self.max_frequency_hz
                ),
            ));
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return Err(invalid("yin_threshold", "must lie in (0, 1)"));
        }
        if self.frame_size < 16 {
            return Err(invalid("frame_size", "must be at least 16 samples"));
        }
        if self.intonation_window == 0 {
            return Err(invalid("intonation_window", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrainerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TrainerConfig::from_json(r#"{ "cent_tolerance": 20.0, "difficulty": "hard" }"#)
            .unwrap();
        assert_eq!(config.cent_tolerance, 20.0);
        assert_eq!(config.smoothing_window_size, 5);
        assert_eq!(config.effective_tolerance(), 10.0);
    }

    #[test]
    fn rejects_inverted_frequency_range() {
        let config = TrainerConfig {
            min_frequency_hz: 500.0,
            max_frequency_hz: 100.0,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "min_frequency_hz", .. })
        ));
    }

    #[test]
    fn rejects_hold_too_long_for_a_duration() {
        let err = TrainerConfig::from_json(r#"{ "required_hold_secs": 1e30 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "required_hold_secs", .. }
        ));

        let config = TrainerConfig {
            required_hold_secs: f32::INFINITY,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.hold_duration(), Duration::MAX);
    }

    #[test]
    fn rejects_zero_history() {
        let config = TrainerConfig {
            pitch_history_capacity: 0,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert!("impossible".parse::<Difficulty>().is_err());
    }
}
