//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더입니다.
//! 인덱스와 파이프라인은 구체 모델이 아니라 [`EmbeddingProvider`] 트레이트에만 의존합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(url, "nomic-embed-text", Device::Gpu, timeout)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod hashing;
mod ollama;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbedderKind, Settings};

pub use hashing::HashingEmbedding;
pub use ollama::OllamaEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 입력에는 같은 벡터를 반환해야 합니다 (배치 경계와 무관).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수 (모델 응답 전에는 알 수 없으면 None)
    fn dimension(&self) -> Option<usize>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match settings.embedder {
        EmbedderKind::Ollama => Arc::new(OllamaEmbedding::new(
            &settings.ollama_url,
            &settings.embed_model,
            settings.device,
            settings.request_timeout,
        )?),
        EmbedderKind::Hashing => Arc::new(HashingEmbedding::new(settings.hashing_dimension)?),
    };

    tracing::info!("Using embedding provider: {}", embedder.name());
    Ok(embedder)
}
