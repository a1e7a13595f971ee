//! # Error Types
//!
//! Every failure in the core is local and recoverable from the caller's
//! point of view. "No pitch" is not an error and never appears here.

use std::path::PathBuf;

/// Failures while acquiring or releasing the microphone stream.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("no suitable f32 input format found")]
    NoSupportedConfig,

    #[error("could not query input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("could not read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("could not query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("could not build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("could not start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("could not pause input stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// A malformed exercise definition, reported when the run is started.
#[derive(Debug, thiserror::Error)]
pub enum ExerciseError {
    #[error("exercise has no notes")]
    Empty,

    #[error("unknown note name `{name}` at position {index}")]
    UnknownNote { index: usize, name: String },

    #[error("transposing `{note}` by {semitones} semitones leaves the note range")]
    TransposeOutOfRange { note: String, semitones: i32 },

    #[error("could not parse exercise definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not read exercise file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid or unreadable trainer configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures while saving or loading progress statistics.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("progress file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not (de)serialize progress: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Umbrella error for callers that do not care which stage failed.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Exercise(#[from] ExerciseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
