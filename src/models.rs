//! Model catalog diagnostic
//!
//! Lists the models available to the configured credential. Standalone
//! utility sharing the process configuration; not part of the interaction
//! pipeline.

use crate::config::Config;
use crate::error::classify_status;
use crate::{Error, Result};

/// One available model descriptor
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelEntry {
    /// Model identifier (e.g. "models/gemini-pro")
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl std::fmt::Display for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
    next_page_token: Option<String>,
}

/// Client for the provider's model-listing endpoint
pub struct ModelCatalog {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ModelCatalog {
    /// Create a catalog client from the process configuration
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.llm.base_url.clone(),
        }
    }

    /// Fetch all available models, following pagination
    ///
    /// # Errors
    ///
    /// Returns classified provider errors or [`Error::Llm`]
    pub async fn list(&self) -> Result<Vec<ModelEntry>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/v1beta/models", self.base_url))
                .header("x-goog-api-key", &self.api_key);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(|e| {
                tracing::error!(error = %e, "model listing request failed");
                Error::ProviderUnavailable(e.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "model listing error");
                return Err(classify_status(status, &body, Error::Llm));
            }

            let page: ListModelsResponse = response
                .json()
                .await
                .map_err(|e| Error::Llm(format!("malformed response: {e}")))?;

            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(count = models.len(), "model catalog fetched");
        Ok(models)
    }
}
