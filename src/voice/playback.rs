//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Sample rate assumed for raw sample playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Interval between completion/cancellation checks while playing
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Plays an in-memory audio stream to completion
///
/// Implementations block the calling thread; [`PlaybackSlot`] runs them on
/// a blocking worker.
pub trait AudioPlayer: Send + Sync + 'static {
    /// Play MP3 `audio`, returning early once `cancel` is set
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    fn play(&self, audio: &[u8], cancel: &AtomicBool) -> Result<()>;
}

/// Plays audio on the default output device
///
/// The device is opened for each playback and released when it ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerPlayer;

impl SpeakerPlayer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Play mono f32 samples at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device is available
    pub fn play_samples(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        cancel: &AtomicBool,
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config = output_config(&device, sample_rate)?;
        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio playback initialized"
        );

        let sample_count = samples.len();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_flag = Arc::clone(&finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or_else(|| {
                            finished_flag.store(true, Ordering::Release);
                            0.0
                        });

                        for out in frame.iter_mut() {
                            *out = sample;
                        }

                        if position < samples.len() {
                            position += 1;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        while !finished.load(Ordering::Acquire) {
            if cancel.load(Ordering::Acquire) {
                tracing::debug!("playback cancelled");
                drop(stream);
                return Ok(());
            }
            if start.elapsed() > timeout {
                tracing::warn!("playback did not signal completion before timeout");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        // let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

impl AudioPlayer for SpeakerPlayer {
    fn play(&self, audio: &[u8], cancel: &AtomicBool) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(audio)?;
        self.play_samples(samples, sample_rate, cancel)
    }
}

/// Pick an output config at `sample_rate`, mono preferred
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |c: &SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .ok_or_else(|| Error::Audio(format!("no output config supports {sample_rate} Hz")))?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data contains no decodable frames
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate);

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right =
                            f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Audio("no MP3 frames found".to_string()))?;
    let sample_rate = u32::try_from(sample_rate)
        .map_err(|_| Error::Audio(format!("invalid MP3 sample rate {sample_rate}")))?;

    Ok((samples, sample_rate))
}

struct ActivePlayback {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Single-slot playback dispatcher
///
/// Each dispatch cancels the playback still in flight and starts the new one
/// on a blocking worker, so rapid submissions never stack up audio.
pub struct PlaybackSlot {
    player: Arc<dyn AudioPlayer>,
    active: Option<ActivePlayback>,
}

impl PlaybackSlot {
    #[must_use]
    pub fn new(player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            player,
            active: None,
        }
    }

    /// Start playing `audio` without waiting for it to finish
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&mut self, audio: Vec<u8>) {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let player = Arc::clone(&self.player);
        let bytes = audio.len();

        let handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = player.play(&audio, &flag) {
                tracing::warn!(error = %e, "audio playback failed");
            }
        });

        tracing::debug!(bytes, "playback dispatched");
        self.active = Some(ActivePlayback { cancel, handle });
    }

    /// Cancel the playback in flight, if any
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            if !active.handle.is_finished() {
                tracing::debug!("cancelling previous playback");
            }
            active.cancel.store(true, Ordering::Release);
        }
    }

    /// Whether a playback is still running
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Wait for the playback in flight to finish
    pub async fn wait(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.handle.await {
                tracing::warn!(error = %e, "playback worker panicked");
            }
        }
    }
}

impl Drop for PlaybackSlot {
    fn drop(&mut self) {
        self.stop();
    }
}
