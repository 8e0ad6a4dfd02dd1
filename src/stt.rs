//! Speech-to-text stage
//!
//! Sends one captured audio sample to the Google Cloud Speech
//! `speech:recognize` endpoint. A single failed attempt ends the
//! interaction; the caller re-captures for the next attempt.

use async_trait::async_trait;
use base64::Engine;

use crate::audio::AudioSample;
use crate::config::Config;
use crate::{Error, Result};

/// Turns one audio sample into a transcript
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio to text.
    ///
    /// # Errors
    ///
    /// [`Error::NotUnderstood`] when the provider produced no hypothesis,
    /// [`Error::Stt`] with the provider's detail on transport/API failure.
    async fn transcribe(&self, sample: &AudioSample) -> Result<String>;
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    language_code: &'a str,
}

#[derive(serde::Serialize)]
struct RecognitionAudio {
    /// Base64-encoded WAV bytes
    content: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(serde::Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(serde::Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

/// Google Cloud Speech client
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
}

impl SpeechToText {
    /// Create an STT client from the process configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.stt.base_url.clone(),
            language: config.stt.language.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, sample: &AudioSample) -> Result<String> {
        tracing::debug!(
            duration = ?sample.duration(),
            samples = sample.samples.len(),
            "starting transcription"
        );

        let wav = sample.to_wav()?;
        let request = RecognizeRequest {
            config: RecognitionConfig {
                language_code: &self.language,
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&wav),
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/speech:recognize", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "STT request failed");
                Error::Stt(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Stt(format!("{status}: {body}")));
        }

        let result: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("malformed response: {e}")))?;

        let transcript = result
            .results
            .first()
            .and_then(|r| r.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default();

        if transcript.is_empty() {
            tracing::info!("no hypothesis for captured audio");
            return Err(Error::NotUnderstood);
        }

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
