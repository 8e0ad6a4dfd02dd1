//! Audio playback to speakers
//!
//! Playback is one capability behind [`AudioPlayer`] with two
//! implementations: [`BlockingPlayer`] polls the mixer until it goes idle
//! (console), [`DetachedPlayer`] hands the artifact to a background thread
//! and returns immediately (web UI). Both bound the wait by the clip's
//! expected duration and delete the transient artifact once playback is done.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::tts::AudioArtifact;
use crate::{Error, Result};

/// Fixed interval at which players poll the mixer for completion
const MIXER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra wait allowed past a clip's nominal duration before a poll loop
/// stops trusting the mixer's activity report
const PLAYBACK_SLACK: Duration = Duration::from_millis(500);

/// Sample rate assumed when an MP3 stream has no frames
const FALLBACK_SAMPLE_RATE: u32 = 24000;

/// An audio output subsystem: load samples, start, report activity
pub trait Mixer {
    /// Start playing the given mono samples
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    fn start(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()>;

    /// Whether playback is still in progress
    fn is_active(&self) -> bool;
}

/// Plays a synthesized [`AudioArtifact`] and releases it
pub trait AudioPlayer {
    /// Play the artifact; the artifact is consumed and its backing file is
    /// deleted once playback is done
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or the output device cannot be opened
    fn play(&mut self, artifact: AudioArtifact) -> Result<()>;
}

/// Mixer over a cpal output stream
pub struct CpalMixer {
    stream: Option<Stream>,
    finished: Arc<Mutex<bool>>,
}

impl CpalMixer {
    /// Create an idle mixer; the output device is opened on `start`
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: None,
            finished: Arc::new(Mutex::new(false)),
        }
    }
}

impl Default for CpalMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer for CpalMixer {
    fn start(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            *self.finished.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = true;
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            samples = samples.len(),
            "playback started"
        );

        *self.finished.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = false;

        let finished = Arc::clone(&self.finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = if position < samples.len() {
                            let s = samples[position];
                            position += 1;
                            s
                        } else {
                            if let Ok(mut done) = finished.lock() {
                                *done = true;
                            }
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
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
        self.stream = Some(stream);

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
            && !*self
                .finished
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Console playback: blocks the calling thread until the mixer goes idle
pub struct BlockingPlayer<M: Mixer> {
    mixer: M,
    poll_interval: Duration,
}

impl BlockingPlayer<CpalMixer> {
    /// Create a blocking player over the default output device
    #[must_use]
    pub fn new() -> Self {
        Self::with_mixer(CpalMixer::new())
    }
}

impl Default for BlockingPlayer<CpalMixer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mixer> BlockingPlayer<M> {
    /// Create a blocking player over a specific mixer
    #[must_use]
    pub fn with_mixer(mixer: M) -> Self {
        Self {
            mixer,
            poll_interval: MIXER_POLL_INTERVAL,
        }
    }
}

impl<M: Mixer> AudioPlayer for BlockingPlayer<M> {
    fn play(&mut self, artifact: AudioArtifact) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(&artifact.bytes()?)?;

        let timeout = playback_timeout(samples.len(), sample_rate);
        self.mixer.start(samples, sample_rate)?;
        poll_until_idle(&self.mixer, self.poll_interval, timeout);

        tracing::debug!(path = %artifact.path().display(), "playback complete");
        drop(artifact);
        Ok(())
    }
}

/// Factory producing a mixer inside the playback thread (cpal streams are
/// not `Send`, so the mixer cannot cross the thread boundary itself)
type MixerFactory = Arc<dyn Fn() -> Result<Box<dyn Mixer>> + Send + Sync>;

/// Fire-and-forget playback for the web UI: decoding happens on the calling
/// thread, then a background thread owns the artifact for the duration of
/// playback and deletes it when done
pub struct DetachedPlayer {
    make_mixer: MixerFactory,
    poll_interval: Duration,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DetachedPlayer {
    /// Create a detached player over the default output device
    #[must_use]
    pub fn new() -> Self {
        Self::with_mixer_factory(Arc::new(|| Ok(Box::new(CpalMixer::new()) as Box<dyn Mixer>)))
    }

    /// Create a detached player with a custom mixer factory
    #[must_use]
    pub fn with_mixer_factory(make_mixer: MixerFactory) -> Self {
        Self {
            make_mixer,
            poll_interval: MIXER_POLL_INTERVAL,
            handle: None,
        }
    }

    /// Block until the most recent hand-off has finished playing
    pub fn wait_idle(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for DetachedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlayer for DetachedPlayer {
    fn play(&mut self, artifact: AudioArtifact) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(&artifact.bytes()?)?;

        let make_mixer = Arc::clone(&self.make_mixer);
        let poll_interval = self.poll_interval;

        let handle = std::thread::spawn(move || {
            let result = (|| -> Result<()> {
                let timeout = playback_timeout(samples.len(), sample_rate);
                let mut mixer = make_mixer()?;
                mixer.start(samples, sample_rate)?;
                poll_until_idle(mixer.as_ref(), poll_interval, timeout);
                Ok(())
            })();

            if let Err(e) = result {
                tracing::error!(error = %e, "detached playback failed");
            }

            tracing::debug!(path = %artifact.path().display(), "playback complete");
            // Artifact dropped here; the temp file is removed
            drop(artifact);
        });

        self.handle = Some(handle);
        Ok(())
    }
}

/// Worst-case wait for a clip: its nominal duration plus [`PLAYBACK_SLACK`]
fn playback_timeout(sample_count: usize, sample_rate: u32) -> Duration {
    let count = u64::try_from(sample_count).unwrap_or(u64::MAX);
    let duration_ms = count.saturating_mul(1000) / u64::from(sample_rate.max(1));
    Duration::from_millis(duration_ms) + PLAYBACK_SLACK
}

/// Poll the mixer until it reports idle, giving up once the clip should
/// long since have finished
fn poll_until_idle(mixer: &dyn Mixer, poll_interval: Duration, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    while mixer.is_active() {
        if std::time::Instant::now() >= deadline {
            tracing::warn!(
                timeout = ?timeout,
                "mixer still active past expected clip duration; abandoning poll"
            );
            break;
        }
        std::thread::sleep(poll_interval);
    }
}

/// Decode MP3 bytes to mono f32 samples, returning the stream's sample rate
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = FALLBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }

                // Convert i16 samples to f32 and fold stereo down to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mixer double that stays active for a fixed number of polls
    struct CountingMixer {
        polls_until_idle: usize,
        polls: Arc<AtomicUsize>,
        started: Arc<AtomicUsize>,
    }

    impl Mixer for CountingMixer {
        fn start(&mut self, _samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) < self.polls_until_idle
        }
    }

    fn empty_mp3_artifact() -> AudioArtifact {
        // No MP3 frames decode to zero samples, which is fine for the
        // mixer doubles here
        AudioArtifact::from_bytes(&[]).unwrap()
    }

    #[test]
    fn test_blocking_play_polls_mixer_until_idle() {
        let polls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let mixer = CountingMixer {
            polls_until_idle: 3,
            polls: Arc::clone(&polls),
            started: Arc::clone(&started),
        };

        let mut player = BlockingPlayer::with_mixer(mixer);
        player.poll_interval = Duration::from_millis(1);
        player.play(empty_mp3_artifact()).unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 1);
        // Polled at least once before returning
        assert!(polls.load(Ordering::SeqCst) >= 1);
        // Kept polling until the mixer reported idle
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_blocking_play_removes_artifact() {
        let polls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let mixer = CountingMixer {
            polls_until_idle: 0,
            polls,
            started,
        };

        let artifact = empty_mp3_artifact();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        let mut player = BlockingPlayer::with_mixer(mixer);
        player.poll_interval = Duration::from_millis(1);
        player.play(artifact).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_detached_play_returns_before_cleanup_then_removes_artifact() {
        let polls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let polls_clone = Arc::clone(&polls);
        let started_clone = Arc::clone(&started);

        let mut player = DetachedPlayer::with_mixer_factory(Arc::new(move || {
            Ok(Box::new(CountingMixer {
                polls_until_idle: 2,
                polls: Arc::clone(&polls_clone),
                started: Arc::clone(&started_clone),
            }) as Box<dyn Mixer>)
        }));
        player.poll_interval = Duration::from_millis(1);

        let artifact = empty_mp3_artifact();
        let path = artifact.path().to_path_buf();

        player.play(artifact).unwrap();
        player.wait_idle();

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(!path.exists());
    }

    /// Mixer double that never reports idle
    struct StuckMixer;

    impl Mixer for StuckMixer {
        fn start(&mut self, _samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
            Ok(())
        }

        fn is_active(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_blocking_play_gives_up_on_stuck_mixer() {
        let mut player = BlockingPlayer::with_mixer(StuckMixer);
        player.poll_interval = Duration::from_millis(1);

        // Zero samples decode from the empty artifact, so the deadline is
        // just the slack; a mixer that never goes idle must not hang play
        let begin = std::time::Instant::now();
        player.play(empty_mp3_artifact()).unwrap();

        assert!(begin.elapsed() >= PLAYBACK_SLACK);
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_playback_timeout_scales_with_clip_length() {
        // One second of audio plus the slack
        assert_eq!(
            playback_timeout(24000, 24000),
            Duration::from_secs(1) + PLAYBACK_SLACK
        );
        // A zero sample rate must not divide by zero
        assert_eq!(playback_timeout(100, 0), Duration::from_millis(100_000) + PLAYBACK_SLACK);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        // minimp3 skips non-frame bytes, so pure noise decodes to nothing
        let (samples, _) = decode_mp3(&[0u8; 64]).unwrap();
        assert!(samples.is_empty());
    }
}
