//! Ollama 임베딩 클라이언트
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Device;
use crate::http::{build_client, post_json};

use super::EmbeddingProvider;

/// Ollama 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    device: Device,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: `http://127.0.0.1:11434`)
    /// * `model` - 임베딩 모델 이름
    /// * `device` - 실행 장치
    /// * `timeout` - 요청 타임아웃
    pub fn new(base_url: &str, model: &str, device: Device, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");

        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            device,
        })
    }

    async fn request(&self, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbedRequest {
            model: &self.model,
            input,
            options: ModelOptions::for_device(self.device),
        };

        let body = post_json(&self.client, &self.endpoint, None, &request).await?;
        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        anyhow::ensure!(
            response.embeddings.len() == expected,
            "Ollama returned {} embeddings for {} inputs",
            response.embeddings.len(),
            expected
        );
        Ok(response.embeddings)
    }
}

/// Ollama 모델 옵션
#[derive(Debug, Serialize)]
struct ModelOptions {
    num_gpu: u32,
}

impl ModelOptions {
    fn for_device(device: Device) -> Option<Self> {
        device.ollama_num_gpu().map(|num_gpu| Self { num_gpu })
    }
}

/// Ollama API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

/// Ollama API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(vec![text])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Ollama returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        tracing::debug!("Embedding batch of {} texts with {}", texts.len(), self.model);
        self.request(texts.iter().map(String::as_str).collect()).await
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        &self.model
    }
}
