//! Text-to-speech stage
//!
//! Synthesizes the generated reply into an MP3 artifact via the Google
//! Cloud Text-to-Speech `text:synthesize` endpoint. Every artifact is a
//! uniquely named temp file deleted when the artifact is dropped, in every
//! hosting context.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::classify_status;
use crate::{Error, Result};

/// A synthesized audio file, owned for the duration of playback.
///
/// The backing temp file is removed when the artifact is dropped.
pub struct AudioArtifact {
    file: NamedTempFile,
}

impl AudioArtifact {
    /// Write MP3 bytes to a fresh uniquely named temp file
    ///
    /// # Errors
    ///
    /// Returns error if the temp file cannot be created or written
    pub fn from_bytes(mp3: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("voxpipe-reply-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(mp3)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = mp3.len(), "artifact written");
        Ok(Self { file })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the artifact's MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the backing file cannot be read
    pub fn bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path())?)
    }
}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("path", &self.path())
            .finish()
    }
}

/// Turns one generated reply into a playable artifact
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize speech for the text.
    ///
    /// # Errors
    ///
    /// Classified provider errors or [`Error::Tts`].
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact>;
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(serde::Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: String,
    name: &'a str,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f64,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Google Cloud Text-to-Speech client
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice: String,
    speaking_rate: f64,
}

impl TextToSpeech {
    /// Create a TTS client from the process configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.tts.base_url.clone(),
            voice: config.tts.voice.clone(),
            speaking_rate: config.tts.speaking_rate,
        }
    }

    /// Language code implied by a voice name ("en-US-Standard-C" → "en-US")
    fn language_code(voice: &str) -> String {
        voice.split('-').take(2).collect::<Vec<_>>().join("-")
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact> {
        tracing::debug!(voice = %self.voice, chars = text.len(), "starting synthesis");

        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: Self::language_code(&self.voice),
                name: &self.voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: self.speaking_rate,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/text:synthesize", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "TTS request failed");
                Error::ProviderUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(classify_status(status, &body, Error::Tts));
        }

        let result: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Tts(format!("malformed response: {e}")))?;

        let mp3 = base64::engine::general_purpose::STANDARD
            .decode(result.audio_content)
            .map_err(|e| Error::Tts(format!("invalid audio content: {e}")))?;

        tracing::info!(bytes = mp3.len(), "synthesis complete");
        AudioArtifact::from_bytes(&mp3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> TextToSpeech {
        let mut config = Config::with_api_key("test-key");
        config.tts.base_url = server.url();
        TextToSpeech::new(&config)
    }

    #[test]
    fn test_language_code_from_voice() {
        assert_eq!(TextToSpeech::language_code("en-US-Standard-C"), "en-US");
        assert_eq!(TextToSpeech::language_code("de-DE-Wavenet-A"), "de-DE");
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let artifact = AudioArtifact::from_bytes(b"mp3 bytes").unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_artifacts_get_unique_paths() {
        let a = AudioArtifact::from_bytes(b"a").unwrap();
        let b = AudioArtifact::from_bytes(b"b").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_synthesize_writes_decoded_audio() {
        use base64::Engine as _;

        let mp3 = b"fake mp3 payload";
        let encoded = base64::engine::general_purpose::STANDARD.encode(mp3);

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/text:synthesize")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body(format!(r#"{{"audioContent":"{encoded}"}}"#))
            .create_async()
            .await;

        let tts = client_for(&server);
        let artifact = tts.synthesize("Hello there").await.unwrap();

        assert_eq!(artifact.bytes().unwrap(), mp3);
        assert!(artifact.path().exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_provider_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/text:synthesize")
            .with_status(503)
            .with_body("backend overloaded")
            .create_async()
            .await;

        let tts = client_for(&server);
        let err = tts.synthesize("Hello").await.unwrap_err();

        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }
}
