//! OpenAI chat completion backend.

use super::{ChatTurn, GenerationRequest, Generator, Role};
use crate::error::{Result, SvarError};
use crate::openai::create_client;
use crate::retry::RetryPolicy;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Chat generator backed by the OpenAI API.
pub struct OpenAiGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    retry: RetryPolicy,
}

impl OpenAiGenerator {
    pub fn new() -> Self {
        Self {
            client: create_client(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn convert_turn(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage> {
        let message = match turn.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(|e| SvarError::Generation(e.to_string()))?
                .into(),
        };
        Ok(message)
    }
}

impl Default for OpenAiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = request
            .messages
            .iter()
            .map(Self::convert_turn)
            .collect::<Result<_>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature);
        if let Some(max_tokens) = request.max_tokens {
            builder.max_tokens(max_tokens);
        }
        let api_request = builder
            .build()
            .map_err(|e| SvarError::Generation(e.to_string()))?;

        let response = self
            .retry
            .run("chat completion", || {
                let api_request = api_request.clone();
                async move { self.client.chat().create(api_request).await }
            })
            .await
            .map_err(|e| SvarError::UpstreamUnavailable {
                service: "generation",
                detail: e.to_string(),
            })?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| SvarError::Generation("Empty response from model".to_string()))?
            .clone();

        debug!("Received {} characters from model", answer.len());
        Ok(answer)
    }
}
