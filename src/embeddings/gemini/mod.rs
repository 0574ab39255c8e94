#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::zero_vector;
use crate::config::EmbeddingConfig;
use crate::{RecsyncError, Result};

/// Output dimensionality requested from the provider. The index schema is
/// created with the same width, so changing this requires a full rebuild.
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Which side of a retrieval pair a text belongs to. The provider embeds
/// documents and queries into slightly different regions of the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Document,
    Query,
}

impl EmbeddingTask {
    #[inline]
    fn as_api_str(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    model: String,
    api_key: String,
    dimension: u32,
    max_input_chars: usize,
    pacing: Duration,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: RequestContent,
    task_type: String,
    output_dimensionality: u32,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "supportedGenerationMethods")]
    pub supported_generation_methods: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .provider_url()
            .context("Failed to generate provider URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
            dimension: config.dimension,
            max_input_chars: config.max_input_chars,
            pacing: Duration::from_millis(config.pacing_ms),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// The vector width this client requests and enforces on responses.
    #[inline]
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Test connection to the embedding provider and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for provider at {}", self.base_url);

        // First check if the provider is reachable
        self.ping().context("Provider ping failed")?;

        // Then check if the model is available
        self.validate_model().context("Model validation failed")?;

        info!(
            "Health check passed for embedding provider at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the embedding provider to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("v1beta/models")
            .context("Failed to build ping URL")?;

        debug!("Pinging embedding provider at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .header("x-goog-api-key", &self.api_key)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to ping embedding provider")?;

        debug!("Provider ping successful");
        Ok(())
    }

    /// Validate that the configured model is available
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        debug!("Validating model: {}", self.model);

        let models = self.list_models().context("Failed to list models")?;
        let qualified = format!("models/{}", self.model);

        if models
            .iter()
            .any(|m| m.name == qualified || m.name == self.model)
        {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(RecsyncError::Config(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all models the provider exposes
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("v1beta/models")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .header("x-goog-api-key", &self.api_key)
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input.
    ///
    /// Input longer than the configured ceiling is truncated before
    /// transmission. A response whose width differs from the configured
    /// dimension is rejected rather than passed downstream.
    #[inline]
    pub fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        let input = self.clamp_input(text);
        debug!(
            "Generating {} embedding for text (length: {})",
            task.as_api_str(),
            input.len()
        );

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: RequestContent {
                parts: vec![RequestPart { text: input }],
            },
            task_type: task.as_api_str().to_string(),
            output_dimensionality: self.dimension,
        };

        let url = self.embed_url()?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        // No context wrap here: the classified error variant must reach the
        // caller intact so per-key failures carry the real reason.
        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| RecsyncError::ProviderUnavailable(format!("malformed embedding response: {e}")))?;

        let values = response.embedding.values;
        if values.len() != self.dimension as usize {
            return Err(RecsyncError::DimensionMismatch {
                expected: self.dimension as usize,
                actual: values.len(),
            });
        }

        debug!("Generated embedding with {} dimensions", values.len());
        Ok(values)
    }

    /// Generate embeddings for multiple texts, preserving order and length.
    ///
    /// A failed item yields a zero vector in its slot instead of aborting the
    /// batch; only a dimension mismatch aborts, since it poisons every
    /// subsequent item the same way. Calls are paced by the configured delay.
    #[inline]
    pub fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        for (index, text) in texts.iter().enumerate() {
            match self.embed(text, task) {
                Ok(vector) => results.push(vector),
                Err(RecsyncError::DimensionMismatch { expected, actual }) => {
                    return Err(RecsyncError::DimensionMismatch { expected, actual });
                }
                Err(error) => {
                    warn!(
                        "Embedding failed for batch item {}: {}, substituting zero vector",
                        index, error
                    );
                    results.push(zero_vector(self.dimension));
                }
            }

            if index + 1 < texts.len() && !self.pacing.is_zero() {
                std::thread::sleep(self.pacing);
            }
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_url(&self) -> Result<Url> {
        let url = self
            .base_url
            .join(&format!("v1beta/models/{}:embedContent", self.model))
            .context("Failed to build embedding URL")?;
        Ok(url)
    }

    fn clamp_input(&self, text: &str) -> String {
        if text.chars().count() > self.max_input_chars {
            warn!(
                "Embedding input exceeds {} characters, truncating",
                self.max_input_chars
            );
            text.chars().take(self.max_input_chars).collect()
        } else {
            text.to_string()
        }
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let classified = match &error {
                        ureq::Error::StatusCode(429) => {
                            warn!(
                                "Rate limited (status 429), attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            RecsyncError::RateLimited(
                                "embedding provider returned HTTP 429".to_string(),
                            )
                        }
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            RecsyncError::ProviderUnavailable(format!(
                                "embedding provider returned HTTP {status}"
                            ))
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(RecsyncError::InvalidInput(format!(
                                "embedding provider rejected the request: HTTP {status}"
                            )));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            RecsyncError::ProviderUnavailable(format!(
                                "embedding request failed: {error}"
                            ))
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(RecsyncError::ProviderUnavailable(format!(
                                "embedding request failed: {error}"
                            )));
                        }
                    };

                    last_error = Some(classified);

                    // Wait before retry (exponential backoff)
                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| {
            RecsyncError::ProviderUnavailable("request failed after retries".to_string())
        }))
    }
}
