//! Interaction pipeline
//!
//! One interaction flows strictly forward: capture → transcribe → respond →
//! synthesize. Recoverable transcription outcomes end the interaction with a
//! user-visible notice and never reach the later stages; classified provider
//! failures in the later stages propagate as errors.

use std::sync::Arc;

use crate::audio::AudioSample;
use crate::config::Config;
use crate::llm::{Gemini, Responder};
use crate::stt::{SpeechToText, Transcriber};
use crate::tts::{AudioArtifact, Synthesizer, TextToSpeech};
use crate::{Error, Result};

/// Result of one interaction
#[derive(Debug)]
pub enum Outcome {
    /// Full pipeline success: transcript, generated reply, and the
    /// synthesized artifact awaiting playback
    Reply {
        /// What the user said
        transcript: String,
        /// What the model answered
        reply: String,
        /// Synthesized speech for the reply
        artifact: AudioArtifact,
    },

    /// The provider could not map the audio to any text
    NotUnderstood,

    /// The speech-to-text provider failed; detail is verbatim from the
    /// provider
    TranscriptionFailed {
        /// Provider-supplied error detail
        detail: String,
    },
}

impl Outcome {
    /// User-visible notice for the recoverable outcomes
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Reply { .. } => None,
            Self::NotUnderstood => Some("Sorry, I did not understand that.".to_string()),
            Self::TranscriptionFailed { detail } => {
                Some(format!("Could not request results; {detail}"))
            }
        }
    }
}

/// The transcribe → respond → synthesize pipeline.
///
/// Stage clients are constructed once at process start from the shared
/// configuration and reused for every interaction.
pub struct Pipeline {
    stt: Arc<dyn Transcriber>,
    llm: Arc<dyn Responder>,
    tts: Arc<dyn Synthesizer>,
}

impl Pipeline {
    /// Wire the real provider clients from the process configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            stt: Arc::new(SpeechToText::new(config)),
            llm: Arc::new(Gemini::new(config)),
            tts: Arc::new(TextToSpeech::new(config)),
        }
    }

    /// Build a pipeline from explicit stage implementations
    #[must_use]
    pub fn with_stages(
        stt: Arc<dyn Transcriber>,
        llm: Arc<dyn Responder>,
        tts: Arc<dyn Synthesizer>,
    ) -> Self {
        Self { stt, llm, tts }
    }

    /// Run transcribe → respond → synthesize for one captured sample.
    ///
    /// Recoverable transcription outcomes come back as `Ok` variants and
    /// short-circuit the later stages.
    ///
    /// # Errors
    ///
    /// Classified generation or synthesis failures.
    pub async fn converse(&self, sample: &AudioSample) -> Result<Outcome> {
        let transcript = match self.stt.transcribe(sample).await {
            Ok(text) => text,
            Err(Error::NotUnderstood) => return Ok(Outcome::NotUnderstood),
            Err(Error::Stt(detail)) => return Ok(Outcome::TranscriptionFailed { detail }),
            Err(e) => return Err(e),
        };

        tracing::info!(transcript = %transcript, "user said");

        let reply = self.llm.respond(&transcript).await?;
        tracing::info!(reply = %reply, "assistant says");

        let artifact = self.tts.synthesize(&reply).await?;

        Ok(Outcome::Reply {
            transcript,
            reply,
            artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct StubTranscriber {
        result: fn() -> Result<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _sample: &AudioSample) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct StubResponder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Responder for StubResponder {
        async fn respond(&self, transcript: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("echo: {transcript}"))
        }
    }

    struct StubSynthesizer {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Synthesizer for StubSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<AudioArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AudioArtifact::from_bytes(b"mp3")
        }
    }

    struct Counters {
        stt: Arc<AtomicUsize>,
        llm: Arc<AtomicUsize>,
        tts: Arc<AtomicUsize>,
    }

    fn pipeline_with(stt_result: fn() -> Result<String>) -> (Pipeline, Counters) {
        let counters = Counters {
            stt: Arc::new(AtomicUsize::new(0)),
            llm: Arc::new(AtomicUsize::new(0)),
            tts: Arc::new(AtomicUsize::new(0)),
        };

        let pipeline = Pipeline::with_stages(
            Arc::new(StubTranscriber {
                result: stt_result,
                calls: Arc::clone(&counters.stt),
            }),
            Arc::new(StubResponder {
                calls: Arc::clone(&counters.llm),
            }),
            Arc::new(StubSynthesizer {
                calls: Arc::clone(&counters.tts),
            }),
        );

        (pipeline, counters)
    }

    fn sample() -> AudioSample {
        AudioSample {
            samples: vec![0.1; 160],
            sample_rate: crate::audio::SAMPLE_RATE,
        }
    }

    #[tokio::test]
    async fn test_full_interaction() {
        let (pipeline, counters) = pipeline_with(|| Ok("hello assistant".to_string()));

        let outcome = pipeline.converse(&sample()).await.unwrap();

        match outcome {
            Outcome::Reply {
                transcript,
                reply,
                artifact,
            } => {
                assert_eq!(transcript, "hello assistant");
                assert_eq!(reply, "echo: hello assistant");
                assert!(artifact.path().exists());
            }
            other => panic!("expected reply, got {other:?}"),
        }

        assert_eq!(counters.stt.load(Ordering::SeqCst), 1);
        assert_eq!(counters.llm.load(Ordering::SeqCst), 1);
        assert_eq!(counters.tts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_understood_short_circuits_later_stages() {
        let (pipeline, counters) = pipeline_with(|| Err(Error::NotUnderstood));

        let outcome = pipeline.converse(&sample()).await.unwrap();

        assert!(matches!(outcome, Outcome::NotUnderstood));
        assert_eq!(counters.llm.load(Ordering::SeqCst), 0);
        assert_eq!(counters.tts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stt_failure_short_circuits_and_keeps_detail() {
        let (pipeline, counters) =
            pipeline_with(|| Err(Error::Stt("connection reset by peer".to_string())));

        let outcome = pipeline.converse(&sample()).await.unwrap();

        match &outcome {
            Outcome::TranscriptionFailed { detail } => {
                assert_eq!(detail, "connection reset by peer");
            }
            other => panic!("expected transcription failure, got {other:?}"),
        }

        // The user-visible notice carries the provider detail verbatim
        assert!(
            outcome
                .notice()
                .unwrap()
                .contains("connection reset by peer")
        );
        assert_eq!(counters.llm.load(Ordering::SeqCst), 0);
        assert_eq!(counters.tts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reply_outcome_has_no_notice() {
        let (pipeline, _) = pipeline_with(|| Ok("hi".to_string()));
        let outcome = pipeline.converse(&sample()).await.unwrap();
        assert!(outcome.notice().is_none());
    }
}
