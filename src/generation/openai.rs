//! OpenAI 호환 Chat Completions 클라이언트

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::{build_client, post_json};

use super::{GenerationParams, GenerationProvider};

/// OpenAI API 기본 주소
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI 호환 생성 구현체
#[derive(Debug, Clone)]
pub struct OpenAiGeneration {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiGeneration {
    pub fn new(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");

        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAiGeneration {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let body = post_json(&self.client, &self.endpoint, Some(&self.api_key), &request).await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no content"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
