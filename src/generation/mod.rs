//! 생성 모듈 - 프롬프트 → 답변 텍스트
//!
//! 생성 모델과 보조 컨텍스트 소스를 트레이트로 추상화합니다.
//! 어떤 백엔드든 같은 입출력 계약만 지키면 교체할 수 있습니다.

mod context;
mod ollama;
mod openai;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{get_openai_api_key, ContextKind, Settings};

pub use context::{LlmContextSource, CONTEXT_MAX_TOKENS, CONTEXT_TEMPERATURE};
pub use ollama::OllamaGeneration;
pub use openai::{OpenAiGeneration, OPENAI_BASE_URL};

// ============================================================================
// Generation Parameters
// ============================================================================

/// 샘플링 파라미터
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// 샘플링 온도
    pub temperature: f32,
    /// 최대 생성 토큰 수
    pub max_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// 생성 모델 프로바이더
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 보조 컨텍스트 소스
///
/// 실패하거나 시간 초과될 수 있으며, 파이프라인은 이를 빈 컨텍스트로 처리합니다.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// 질의에 대한 배경 컨텍스트 조회
    async fn fetch(&self, query: &str) -> Result<String>;
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 답변 생성용 프로바이더 생성 (Ollama)
pub fn create_generator(settings: &Settings) -> Result<Arc<dyn GenerationProvider>> {
    let generator = OllamaGeneration::new(
        &settings.ollama_url,
        &settings.generation_model,
        settings.device,
        settings.request_timeout,
    )?;
    tracing::info!("Using generation model: {}", generator.name());
    Ok(Arc::new(generator))
}

/// 설정에 맞는 보조 컨텍스트 소스 생성 (없으면 None)
pub fn create_context_source(settings: &Settings) -> Result<Option<Arc<dyn ContextSource>>> {
    let provider: Arc<dyn GenerationProvider> = match settings.context {
        ContextKind::None => return Ok(None),
        ContextKind::Ollama => Arc::new(OllamaGeneration::new(
            &settings.ollama_url,
            &settings.generation_model,
            settings.device,
            settings.request_timeout,
        )?),
        ContextKind::Openai => {
            let api_key = get_openai_api_key().context("OpenAI context source requires an API key")?;
            Arc::new(OpenAiGeneration::new(
                api_key,
                OPENAI_BASE_URL,
                &settings.openai_model,
                settings.request_timeout,
            )?)
        }
    };

    tracing::info!("Using supplementary context from: {}", provider.name());
    Ok(Some(Arc::new(LlmContextSource::new(provider))))
}
