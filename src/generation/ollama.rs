//! Ollama 생성 클라이언트
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Device;
use crate::http::{build_client, post_json};

use super::{GenerationParams, GenerationProvider};

/// Ollama `/api/generate` 구현체 (비스트리밍)
#[derive(Debug, Clone)]
pub struct OllamaGeneration {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    device: Device,
}

impl OllamaGeneration {
    pub fn new(base_url: &str, model: &str, device: Device, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing generation model name");

        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
            device,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, params: &GenerationParams) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                num_gpu: self.device.ollama_num_gpu(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl GenerationProvider for OllamaGeneration {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = self.request(prompt, params);
        let body = post_json(&self.client, &self.endpoint, None, &request).await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama generate response")?;
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
