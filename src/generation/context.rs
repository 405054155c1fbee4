//! LLM 기반 보조 컨텍스트 소스

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{ContextSource, GenerationParams, GenerationProvider};

/// 보조 컨텍스트 샘플링 온도
pub const CONTEXT_TEMPERATURE: f32 = 0.7;
/// 보조 컨텍스트 최대 토큰 수
pub const CONTEXT_MAX_TOKENS: usize = 256;

/// 생성 모델에게 질의의 배경 지식을 요청하는 컨텍스트 소스
pub struct LlmContextSource {
    provider: Arc<dyn GenerationProvider>,
    params: GenerationParams,
}

impl LlmContextSource {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            params: GenerationParams {
                temperature: CONTEXT_TEMPERATURE,
                max_tokens: CONTEXT_MAX_TOKENS,
            },
        }
    }
}

/// 배경 지식 요청 프롬프트
pub(crate) fn context_prompt(query: &str) -> String {
    format!(
        "Provide detailed context about the following query:\n\nQuery: {}\n\nContext:",
        query
    )
}

#[async_trait]
impl ContextSource for LlmContextSource {
    async fn fetch(&self, query: &str) -> Result<String> {
        let text = self
            .provider
            .generate(&context_prompt(query), &self.params)
            .await?;
        Ok(text.trim().to_string())
    }
}
