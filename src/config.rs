//! Configuration for voxpipe
//!
//! One process-wide [`Config`] is built at start-up and passed by reference
//! into each pipeline stage. All settings come from the environment (with an
//! optional `.env` file); the only required value is the provider credential.

use std::time::Duration;

use crate::{Error, Result};

/// Environment variable holding the provider credential
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

/// voxpipe configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider credential, sent as the `x-goog-api-key` header
    pub api_key: String,

    /// Text-generation provider settings
    pub llm: LlmConfig,

    /// Speech-to-text provider settings
    pub stt: SttConfig,

    /// Text-to-speech provider settings
    pub tts: TtsConfig,

    /// Microphone listening-window settings
    pub capture: CaptureConfig,
}

/// Text-generation provider settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API base URL
    pub base_url: String,

    /// Model identifier (e.g. "gemini-pro")
    pub model: String,
}

/// Speech-to-text provider settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// API base URL
    pub base_url: String,

    /// BCP-47 language code for recognition
    pub language: String,
}

/// Text-to-speech provider settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// API base URL
    pub base_url: String,

    /// Voice identifier (e.g. "en-US-Standard-C")
    pub voice: String,

    /// Speaking rate multiplier (0.25 to 4.0)
    pub speaking_rate: f64,
}

/// Microphone listening-window settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Hard bound on one listening window
    pub max_window: Duration,

    /// Trailing silence that ends an utterance
    pub silence_hold: Duration,

    /// Minimum speech duration to accept an utterance
    pub min_speech: Duration,

    /// RMS energy above which a chunk counts as speech
    pub energy_threshold: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-pro".to_string(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://speech.googleapis.com".to_string(),
            language: "en-US".to_string(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://texttospeech.googleapis.com".to_string(),
            voice: "en-US-Standard-C".to_string(),
            speaking_rate: 1.0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_window: Duration::from_secs(10),
            silence_hold: Duration::from_millis(800),
            min_speech: Duration::from_millis(300),
            energy_threshold: 0.03,
        }
    }
}

impl Config {
    /// Build a configuration with the given credential and default provider
    /// settings
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            llm: LlmConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            capture: CaptureConfig::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file from the working directory if present, then
    /// requires `GOOGLE_API_KEY`. Model, voice and language settings can be
    /// overridden via `VOXPIPE_LLM_MODEL`, `VOXPIPE_TTS_VOICE` and
    /// `VOXPIPE_STT_LANGUAGE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the credential is missing or empty.
    pub fn from_env() -> Result<Self> {
        // Best-effort: absence of a .env file is fine
        let _ = dotenvy::dotenv();

        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// The credential is required and checked before anything else is
    /// wired up; no client exists until this succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the credential is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "{API_KEY_VAR} not set; add it to the environment or a .env file"
                ))
            })?;

        let mut config = Self::with_api_key(api_key);

        if let Some(model) = lookup("VOXPIPE_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(voice) = lookup("VOXPIPE_TTS_VOICE") {
            config.tts.voice = voice;
        }
        if let Some(language) = lookup("VOXPIPE_STT_LANGUAGE") {
            config.stt.language = language;
        }

        tracing::debug!(
            llm_model = %config.llm.model,
            tts_voice = %config.tts.voice,
            stt_language = %config.stt.language,
            "configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_is_fatal() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn test_empty_credential_is_fatal() {
        let err = Config::from_lookup(|var| (var == API_KEY_VAR).then(String::new)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = Config::from_lookup(|var| match var {
            API_KEY_VAR => Some("test-key".to_string()),
            "VOXPIPE_LLM_MODEL" => Some("gemini-ultra".to_string()),
            "VOXPIPE_TTS_VOICE" => Some("en-GB-Standard-A".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.llm.model, "gemini-ultra");
        assert_eq!(config.tts.voice, "en-GB-Standard-A");
        // Unset values keep their defaults
        assert_eq!(config.stt.language, "en-US");
    }

    #[test]
    fn test_defaults() {
        let config = Config::with_api_key("test-key");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.llm.model, "gemini-pro");
        assert_eq!(config.stt.language, "en-US");
        assert!((config.tts.speaking_rate - 1.0).abs() < f64::EPSILON);
        assert!(config.capture.max_window > config.capture.silence_hold);
    }
}
