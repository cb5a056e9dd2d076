//! LLM provider port (§6 External Interfaces). Streams are cancellable by
//! dropping the returned stream; no orphan generations survive a drop.

use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::AppError;

pub type TokenStream = BoxStream<'static, Result<String, AppError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError>;
}

pub struct OpenAiLlmProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiLlmProvider {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(AppError::OpenAI)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message.into()])
            .build()
            .map_err(AppError::OpenAI)?;
        let response = self.client.chat().create(request).await.map_err(AppError::OpenAI)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Internal("no completion content received".into()))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(AppError::OpenAI)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message.into()])
            .stream(true)
            .build()
            .map_err(AppError::OpenAI)?;
        let upstream = self.client.chat().create_stream(request).await.map_err(AppError::OpenAI)?;

        let mapped = upstream.map(|chunk| {
            chunk
                .map_err(AppError::OpenAI)
                .map(|resp| {
                    resp.choices
                        .first()
                        .and_then(|c| c.delta.content.clone())
                        .unwrap_or_default()
                })
        });
        Ok(mapped.boxed())
    }
}

/// Deterministic fake, selected via `FAKE_LLM=1` (§6), for tests: returns a
/// canned answer that echoes the prompt's citation markers so tests can
/// assert citation presence without a live model.
pub struct FakeLlmProvider;

impl FakeLlmProvider {
    fn canned_answer(prompt: &str) -> String {
        let citations: Vec<&str> = prompt
            .split_whitespace()
            .filter(|tok| tok.starts_with("[S") && tok.contains(']'))
            .collect();
        if citations.is_empty() {
            "Based on the available context, here is a grounded answer.".to_string()
        } else {
            format!(
                "Based on the available context, here is a grounded answer {}.",
                citations.join(" ")
            )
        }
    }
}

#[async_trait]
impl LlmProvider for FakeLlmProvider {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        Ok(Self::canned_answer(prompt))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError> {
        let answer = Self::canned_answer(prompt);
        let tokens: Vec<Result<String, AppError>> = answer
            .split(' ')
            .map(|w| Ok(format!("{w} ")))
            .collect();
        Ok(stream::iter(tokens).boxed())
    }
}

/// True when `FAKE_LLM=1` is set, matching the teacher's test-selection
/// convention for providers.
pub fn fake_llm_selected() -> bool {
    std::env::var("FAKE_LLM").map(|v| v == "1").unwrap_or(false)
}
