use std::time::Duration;

use anyhow::Result;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use super::{Sampling, VlmClient};
use crate::capture::EncodedFrame;

/// Transport-level ceiling for one chat completion round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Hosted chat-completion backend. Images travel as base64 data URLs inside
/// the user message's content parts.
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: impl Into<String>, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl VlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &str,
        images: &[EncodedFrame],
        sampling: Sampling,
    ) -> Result<String> {
        let parts = [
            vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(prompt)
                    .build()?,
            )],
            images
                .iter()
                .map(|jpeg| -> Result<_, OpenAIError> {
                    let url = format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(jpeg));
                    Ok(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImageArgs::default()
                            .image_url(ImageUrlArgs::default().url(url).build()?)
                            .build()?,
                    ))
                })
                .collect::<Result<Vec<_>, _>>()?,
        ]
        .concat();

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(sampling.temperature)
            .top_p(sampling.top_p)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(parts))
                    .build()?,
            )])
            .build()?;

        debug!(
            model = %self.model,
            image_count = images.len(),
            "sending chat completion request"
        );

        let response = tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.client.chat().create(request),
        )
        .await??;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}
