//! Local Ollama-style embedding provider.
//!
//! Speaks the minimal `/api/embeddings` JSON API: one prompt in, one vector
//! out. The base URL is validated against localhost at construction — a
//! remote host is a fatal configuration error, never a warning.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use super::{EmbedRole, EmbeddingProvider, REQUEST_TIMEOUT_SECS, TRUNCATE_RETRY_THRESHOLD};
use crate::config::EmbeddingConfig;

pub struct OllamaProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.validated_ollama_url()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            dims: config.dim,
        })
    }

    fn request(&self, prompt: &str) -> Result<EmbedOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .with_context(|| format!("embedding request to {}", self.base_url))?;

        let status = response.status();
        if status.is_server_error() {
            return Ok(EmbedOutcome::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("embedding endpoint returned {status}: {text}");
        }

        let json: serde_json::Value = response.json().context("decode embedding response")?;
        Ok(EmbedOutcome::Ok(parse_embedding_response(&json)?))
    }
}

enum EmbedOutcome {
    Ok(Vec<f32>),
    ServerError(u16),
}

impl EmbeddingProvider for OllamaProvider {
    fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>> {
        match self.request(&role.apply(text))? {
            EmbedOutcome::Ok(vec) => Ok(vec),
            EmbedOutcome::ServerError(status) if text.len() > TRUNCATE_RETRY_THRESHOLD => {
                // Likely context overflow: retry once at half length.
                let half = super::truncate_half(text);
                tracing::warn!(
                    status,
                    original = text.len(),
                    truncated = half.len(),
                    "embedding failed, retrying with truncated input"
                );
                match self.request(&role.apply(half))? {
                    EmbedOutcome::Ok(vec) => Ok(vec),
                    EmbedOutcome::ServerError(status) => {
                        bail!("embedding endpoint returned {status} after truncated retry")
                    }
                }
            }
            EmbedOutcome::ServerError(status) => {
                bail!("embedding endpoint returned {status}")
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse `{"embedding": [...]}`.
pub(crate) fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .context("invalid embedding response: missing embedding array")?;
    if embedding.is_empty() {
        bail!("empty embedding returned");
    }
    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
