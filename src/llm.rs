//! Text-generation stage
//!
//! Each call is a stateless single-turn Gemini `generateContent` request:
//! exactly one user-role message carrying the transcript, no history, no
//! streaming, no retry.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::classify_status;
use crate::{Error, Result};

/// Turns one transcript into a generated reply
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply for the transcript.
    ///
    /// # Errors
    ///
    /// Classified provider errors ([`Error::AuthFailure`],
    /// [`Error::QuotaExceeded`], [`Error::ProviderUnavailable`]) or
    /// [`Error::Llm`] for anything else.
    async fn respond(&self, transcript: &str) -> Result<String>;
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(serde::Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(serde::Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(serde::Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini chat-completion client
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl Gemini {
    /// Create an LLM client from the process configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.llm.base_url.clone(),
            model: config.llm.model.clone(),
        }
    }
}

#[async_trait]
impl Responder for Gemini {
    async fn respond(&self, transcript: &str) -> Result<String> {
        tracing::debug!(model = %self.model, "requesting completion");

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: transcript }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "LLM request failed");
                Error::ProviderUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LLM API error");
            return Err(classify_status(status, &body, Error::Llm));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("malformed response: {e}")))?;

        let reply = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Llm("response contained no candidates".to_string()))?;

        tracing::info!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> Gemini {
        let mut config = Config::with_api_key("test-key");
        config.llm.base_url = server.url();
        Gemini::new(&config)
    }

    #[tokio::test]
    async fn test_single_user_message_and_identity_passthrough() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .match_header("x-goog-api-key", "test-key")
            // Exactly one user-role message whose content equals the transcript
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "what time is it"}]}]
            })))
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"It is noon."}]}}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let llm = client_for(&server);
        let reply = llm.respond("what time is it").await.unwrap();

        // Reply equals the provider's content field, unmutated
        assert_eq!(reply, "It is noon.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let llm = client_for(&server);
        let err = llm.respond("hello").await.unwrap_err();

        assert!(matches!(err, Error::AuthFailure(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .with_status(429)
            .with_body("quota exhausted")
            .create_async()
            .await;

        let llm = client_for(&server);
        let err = llm.respond("hello").await.unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-pro:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let llm = client_for(&server);
        let err = llm.respond("hello").await.unwrap_err();

        assert!(matches!(err, Error::Llm(_)));
    }
}
