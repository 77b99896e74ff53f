//! OpenAI-compatible embedding provider.
//!
//! Calls `POST <base>/embeddings` with the standard `{model, input}` shape.
//! Remote endpoints require an API key and log a one-line warning on first
//! use; error bodies are redacted of the key before they can propagate.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{
    redact_key, EmbedRole, EmbeddingProvider, REQUEST_TIMEOUT_SECS, TRUNCATE_RETRY_THRESHOLD,
};
use crate::config::EmbeddingConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    warned: AtomicBool,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!(
                "remote embedding provider requires an API key \
                 (set SAME_EMBED_API_KEY)"
            );
        }
        let base_url = if config.base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            config.base_url.trim().trim_end_matches('/').to_string()
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            dims: config.dim,
            warned: AtomicBool::new(false),
        })
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                endpoint = %self.base_url,
                "embedding via remote endpoint — note text leaves this machine"
            );
        }
    }

    fn request(&self, input: &str) -> Result<EmbedOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [input],
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("embedding request to {}", self.base_url))?;

        let status = response.status();
        if status.is_server_error() {
            return Ok(EmbedOutcome::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!(
                "embedding endpoint returned {status}: {}",
                redact_key(&text, &self.api_key)
            );
        }

        let json: serde_json::Value = response.json().context("decode embedding response")?;
        Ok(EmbedOutcome::Ok(parse_openai_response(&json)?))
    }
}

enum EmbedOutcome {
    Ok(Vec<f32>),
    ServerError(u16),
}

impl EmbeddingProvider for OpenAiProvider {
    fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>> {
        self.warn_once();
        match self.request(&role.apply(text))? {
            EmbedOutcome::Ok(vec) => Ok(vec),
            EmbedOutcome::ServerError(status) if text.len() > TRUNCATE_RETRY_THRESHOLD => {
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

/// Parse `{"data": [{"embedding": [...]}]}`, taking the first entry.
pub(crate) fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .context("invalid embeddings response: missing data[0].embedding")?;
    if embedding.is_empty() {
        bail!("empty embedding returned");
    }
    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
