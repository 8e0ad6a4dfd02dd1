//! Microphone capture with a bounded listening window

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::config::CaptureConfig;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How often the recording loop drains the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Raw audio captured in one listening window.
///
/// Owned exclusively by the capture stage until handed to transcription,
/// discarded after the transcription attempt.
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Mono f32 samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Samples per second
    pub sample_rate: u32,
}

impl AudioSample {
    /// Duration of the captured audio
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Whether the window captured no audio at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode as 16-bit mono WAV bytes for the STT API
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Audio(e.to_string()))?;

            for &sample in &self.samples {
                // Convert f32 [-1.0, 1.0] to i16
                #[allow(clippy::cast_possible_truncation)]
                let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| Error::Audio(e.to_string()))?;
            }

            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Scoped microphone stream feeding a shared sample buffer.
///
/// The input device is opened when the value is created and released when it
/// is dropped, on every exit path including errors.
pub struct Microphone {
    // Held for its lifetime; dropping it closes the device
    _stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl Microphone {
    /// Open the default input device at 16kHz mono and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if no input device exists or the stream cannot be built
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone opened"
        );

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let callback_buffer = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = callback_buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            buffer,
        })
    }

    /// Drain and return the samples captured since the last call
    #[must_use]
    pub fn take_chunk(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Detects the end of a spoken utterance from RMS energy.
///
/// Idle until a chunk crosses the energy threshold, then accumulates until
/// enough speech has been followed by enough trailing silence.
pub struct UtteranceDetector {
    energy_threshold: f32,
    min_speech_samples: usize,
    silence_hold_samples: usize,
    listening: bool,
    speech_samples: usize,
    silence_counter: usize,
}

impl UtteranceDetector {
    /// Create a detector for the given listening-window settings
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let to_samples =
            |d: Duration| (d.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;

        Self {
            energy_threshold: config.energy_threshold,
            min_speech_samples: to_samples(config.min_speech),
            silence_hold_samples: to_samples(config.silence_hold),
            listening: false,
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples; returns true once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > self.energy_threshold;

        if !self.listening {
            if is_speech {
                self.listening = true;
                self.speech_samples = samples.len();
                self.silence_counter = 0;
                tracing::trace!(energy, "speech detected, listening");
            }
            return false;
        }

        if is_speech {
            self.speech_samples += samples.len();
            self.silence_counter = 0;
        } else {
            self.silence_counter += samples.len();
        }

        tracing::trace!(
            speech = self.speech_samples,
            silence = self.silence_counter,
            energy,
            "listening"
        );

        self.silence_counter >= self.silence_hold_samples
            && self.speech_samples >= self.min_speech_samples
    }

    /// Whether any speech has been heard yet
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.listening
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Record one utterance from the default microphone.
///
/// Blocks until the utterance detector reports completion or the window's
/// hard bound elapses; on timeout the accumulated audio is returned as-is
/// and downstream no-match handling covers silent windows. The device is
/// released before returning, on every path.
///
/// # Errors
///
/// Returns error if the input device cannot be opened
pub fn record_utterance(config: &CaptureConfig) -> Result<AudioSample> {
    let microphone = Microphone::open()?;
    let mut detector = UtteranceDetector::new(config);
    let mut recorded = Vec::new();
    let started = Instant::now();

    tracing::debug!(max_window = ?config.max_window, "listening");

    loop {
        std::thread::sleep(POLL_INTERVAL);

        let chunk = microphone.take_chunk();
        let complete = detector.process(&chunk);
        recorded.extend_from_slice(&chunk);

        if complete {
            tracing::debug!(samples = recorded.len(), "utterance complete");
            break;
        }

        if started.elapsed() >= config.max_window {
            tracing::debug!(
                samples = recorded.len(),
                heard_speech = detector.heard_speech(),
                "listening window elapsed"
            );
            break;
        }
    }

    drop(microphone);

    Ok(AudioSample {
        samples: recorded,
        sample_rate: SAMPLE_RATE,
    })
}
