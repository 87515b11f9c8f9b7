mod ollama;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::capture::EncodedFrame;
use crate::config::{EndpointKind, RunConfig};
use crate::error::PipelineError;

/// Sampling parameters forwarded verbatim to the endpoint on every call.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

/// A vision-language endpoint: given a prompt and a set of JPEG frames,
/// return text.
///
/// Each backend adapts its own request and response shapes internally; the
/// orchestrator never branches on endpoint kind. An empty `images` slice is
/// the prompt-only variant used by the synthesis call.
#[async_trait]
pub trait VlmClient: Send + Sync + std::fmt::Debug {
    /// Endpoint family name used in logs and statistics.
    fn name(&self) -> &str;

    /// One inference call.
    async fn generate(
        &self,
        prompt: &str,
        images: &[EncodedFrame],
        sampling: Sampling,
    ) -> anyhow::Result<String>;
}

/// Build the configured backend. Fails before any network traffic when the
/// configuration is incomplete.
pub fn build_client(config: &RunConfig) -> Result<Arc<dyn VlmClient>, PipelineError> {
    config.validate()?;

    match config.endpoint {
        EndpointKind::Ollama => Ok(Arc::new(OllamaClient::new(
            &config.ollama_host,
            &config.ollama_model,
        ))),
        EndpointKind::OpenAi => {
            let api_key = config.openai_api_key.as_deref().ok_or_else(|| {
                PipelineError::Config("OPENAI_API_KEY is not set".to_string())
            })?;
            Ok(Arc::new(OpenAiClient::new(
                api_key,
                &config.openai_model,
                config.openai_base_url.as_deref(),
            )))
        }
    }
}
