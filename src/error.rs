//! Error types for voxpipe

use thiserror::Error;

/// Result type alias for voxpipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in voxpipe
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential etc), fatal before any
    /// interaction starts
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (capture or playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// The speech-to-text provider returned no hypothesis for the audio
    #[error("speech not understood")]
    NotUnderstood,

    /// Speech-to-text transport or API failure; carries the provider's
    /// error detail verbatim
    #[error("STT error: {0}")]
    Stt(String),

    /// Provider rejected the credential (HTTP 401/403)
    #[error("provider auth failure: {0}")]
    AuthFailure(String),

    /// Provider quota or rate limit exhausted (HTTP 429)
    #[error("provider quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Provider unreachable or failing (transport error or HTTP 5xx)
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Text-generation error not covered by a classified variant
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error not covered by a classified variant
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error (artifact file handling)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error ends only the current interaction.
    ///
    /// Recoverable errors are surfaced as a user-visible notice and the
    /// process keeps waiting for the next interaction; everything else
    /// fails the interaction hard.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotUnderstood | Self::Stt(_))
    }
}

/// Map a non-success provider HTTP status to a classified error.
///
/// 401/403 become [`Error::AuthFailure`], 429 [`Error::QuotaExceeded`],
/// 5xx [`Error::ProviderUnavailable`]. Anything else falls through to the
/// stage-specific variant produced by `fallback`.
pub(crate) fn classify_status(
    status: reqwest::StatusCode,
    body: &str,
    fallback: impl FnOnce(String) -> Error,
) -> Error {
    let detail = format!("{status}: {body}");
    match status.as_u16() {
        401 | 403 => Error::AuthFailure(detail),
        429 => Error::QuotaExceeded(detail),
        500..=599 => Error::ProviderUnavailable(detail),
        _ => fallback(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classes() {
        assert!(Error::NotUnderstood.is_recoverable());
        assert!(Error::Stt("timeout".into()).is_recoverable());
        assert!(!Error::Config("no key".into()).is_recoverable());
        assert!(!Error::AuthFailure("denied".into()).is_recoverable());
        assert!(!Error::Tts("bad voice".into()).is_recoverable());
    }

    #[test]
    fn test_status_classification() {
        let auth = classify_status(reqwest::StatusCode::FORBIDDEN, "denied", Error::Llm);
        assert!(matches!(auth, Error::AuthFailure(_)));

        let quota =
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down", Error::Llm);
        assert!(matches!(quota, Error::QuotaExceeded(_)));

        let unavailable = classify_status(reqwest::StatusCode::BAD_GATEWAY, "oops", Error::Tts);
        assert!(matches!(unavailable, Error::ProviderUnavailable(_)));

        let other = classify_status(reqwest::StatusCode::BAD_REQUEST, "bad text", Error::Tts);
        assert!(matches!(other, Error::Tts(_)));
    }
}
