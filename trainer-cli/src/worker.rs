//! # Audio Worker
//!
//! Runs the microphone stream on a dedicated thread and forwards whole
//! frames to the tick loop. The cpal stream is created, owned and
//! stopped on this thread only.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};
use trainer_core::audio;
use trainer_core::AudioFrame;

/// Frames kept in flight between the audio and tick threads. Older
/// frames are dropped when the tick loop falls behind.
const FRAME_QUEUE: usize = 8;

/// Handle to the audio thread.
#[derive(Debug)]
pub struct AudioWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    frames: Receiver<AudioFrame>,
    sample_rate: u32,
}

impl AudioWorker {
    /// Spawns the audio thread and waits until the stream is running.
    ///
    /// # Arguments
    /// * `frame_size` - Samples per analysis frame
    /// * `ticks_per_second` - Rate at which fresh frames should arrive
    ///
    /// # Returns
    /// * `Err(e)` - The device could not be opened; no thread is left running
    pub fn start(frame_size: usize, ticks_per_second: u32) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<AudioFrame>(FRAME_QUEUE);

        let thread_handle = thread::spawn(move || {
            info!("[AUDIO-THREAD] Starting audio capture...");
            let (raw_tx, raw_rx) = crossbeam_channel::bounded::<AudioFrame>(FRAME_QUEUE);

            let mut capture = match audio::start_audio_capture(raw_tx, frame_size, ticks_per_second) {
                Ok(capture) => {
                    let _ = ready_tx.send(Ok(capture.sample_rate()));
                    capture
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            loop {
                crossbeam_channel::select! {
                    recv(raw_rx) -> msg => match msg {
                        Ok(frame) => {
                            // The tick loop only wants recent audio.
                            let _ = frame_tx.try_send(frame);
                        }
                        Err(_) => {
                            warn!("[AUDIO-THREAD] Audio channel closed");
                            break;
                        }
                    },
                    recv(shutdown_rx) -> _ => {
                        info!("[AUDIO-THREAD] Received shutdown signal");
                        break;
                    },
                }
            }

            if let Err(e) = capture.stop() {
                error!("[AUDIO-THREAD] Error stopping stream: {}", e);
            }
            info!("[AUDIO-THREAD] Audio thread finished");
        });

        let sample_rate = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .context("audio thread did not report back")?
            .context("could not start microphone capture")?;

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
            frames: frame_rx,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drains the queue and returns only the newest frame.
    pub fn latest_frame(&self) -> Option<AudioFrame> {
        self.frames.try_iter().last()
    }

    /// Signals the thread to stop and waits for it. Safe to call twice.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("[MAIN] Audio thread panicked");
            }
        }
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
