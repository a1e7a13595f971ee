//! # Audio Capture Module
//!
//! This module handles real-time microphone capture using CPAL
//! (Cross-Platform Audio Library) and slices the incoming stream into
//! fixed-size analysis frames.
//!
//! ## Features
//! - Default input device selection with an f32 format close to 44.1 kHz
//! - Multi-channel input downmixed to mono
//! - Overlapping frames: a full frame is emitted every `hop` samples, so
//!   the analysis loop sees fresh audio at display rate even with long
//!   frames
//! - Idempotent stop

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::collections::VecDeque;

use crate::error::CaptureError;
use crate::AudioFrame;

/// Default number of samples per analysis frame.
///
/// YIN looks at lags up to half of this, which bounds both the lowest
/// detectable pitch and the per-frame cost.
pub const BUFFER_SIZE: usize = 2048;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Turns arbitrary-sized interleaved callback blocks into overlapping
/// mono frames.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    channels: usize,
    frame_size: usize,
    hop: usize,
    window: VecDeque<f32>,
    since_last_frame: usize,
}

impl FrameAssembler {
    /// # Arguments
    /// * `channels` - Interleaved channel count of the input
    /// * `frame_size` - Samples per emitted frame
    /// * `hop` - New samples between consecutive frames (clamped to 1..=frame_size)
    pub fn new(channels: usize, frame_size: usize, hop: usize) -> Self {
        Self {
            channels: channels.max(1),
            frame_size,
            hop: hop.clamp(1, frame_size.max(1)),
            window: VecDeque::with_capacity(frame_size),
            since_last_frame: 0,
        }
    }

    /// Appends one interleaved block and calls `emit` for every frame
    /// that became complete.
    pub fn push_interleaved(&mut self, data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        for chunk in data.chunks(self.channels) {
            let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
            self.window.push_back(mono);
            if self.window.len() > self.frame_size {
                self.window.pop_front();
            }
            self.since_last_frame += 1;

            if self.window.len() == self.frame_size && self.since_last_frame >= self.hop {
                self.since_last_frame = 0;
                emit(self.window.iter().copied().collect());
            }
        }
    }
}

/// A running input stream. Dropping it closes the stream.
pub struct AudioCapture {
    stream: cpal::Stream,
    sample_rate: u32,
    device_name: String,
    stopped: bool,
}

impl AudioCapture {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Pauses the stream. Safe to call any number of times.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.stream.pause()?;
        info!("[AUDIO] Capture stopped on {}", self.device_name);
        Ok(())
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 configuration near 44.1 kHz, preferring mono
/// 3. Streams overlapping frames of `frame_size` samples to `sender`,
///    `frames_per_second` of them at the rate the device actually opened
///
/// Frames are dropped rather than queued when the receiver falls
/// behind; the analysis loop only ever wants recent audio.
///
/// # Returns
/// * `Ok(capture)` - Running stream handle
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<AudioFrame>,
    frame_size: usize,
    frames_per_second: u32,
) -> Result<AudioCapture, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoInputDevice)?;
    let device_name = device.name()?;

    info!("[AUDIO] Using audio input device: {}", device_name);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config =
        find_supported_config(configs, TARGET_SAMPLE_RATE).ok_or(CaptureError::NoSupportedConfig)?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();
    let hop = hop_for_rate(sample_rate, frames_per_second);

    info!(
        "[AUDIO] Selected sample rate: {} Hz, {} channel(s), frame {} / hop {}",
        sample_rate, channels, frame_size, hop
    );

    let err_fn = |err: cpal::StreamError| warn!("[AUDIO] An error occurred on the audio stream: {}", err);

    let mut assembler = FrameAssembler::new(channels, frame_size, hop);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            assembler.push_interleaved(data, |samples| {
                // Send the frame, ignoring errors if the channel is full.
                let _ = sender.try_send(AudioFrame::new(samples, sample_rate));
            });
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok(AudioCapture {
        stream,
        sample_rate,
        device_name,
        stopped: false,
    })
}

/// Samples between frame starts so that `frames_per_second` frames
/// arrive each second at `sample_rate`.
pub fn hop_for_rate(sample_rate: u32, frames_per_second: u32) -> usize {
    (sample_rate / frames_per_second.max(1)).max(1) as usize
}

/// Finds the best supported f32 input configuration.
///
/// Mono is preferred over multi-channel, then the range closest to
/// `target_rate` wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let rate_diff = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (c.channels() != 1, rate_diff)
        })
}
