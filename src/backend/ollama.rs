use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Sampling, VlmClient};
use crate::capture::EncodedFrame;

/// Local model-serving daemon backend, speaking Ollama's `/api/generate`
/// wire format. Images travel as plain base64 strings.
#[derive(Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl VlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[EncodedFrame],
        sampling: Sampling,
    ) -> Result<String> {
        let images: Vec<String> = images
            .iter()
            .map(|jpeg| BASE64_STANDARD.encode(jpeg))
            .collect();

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images,
            stream: false,
            options: GenerateOptions {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
            },
        };

        debug!(
            model = %self.model,
            image_count = body.images.len(),
            "sending generate request to ollama"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("ollama returned {status}: {error_body}");
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse ollama response")?;

        Ok(parsed.response)
    }
}
