//! Retrieval Pipeline - 검색 증강 답변 생성
//!
//! 질의 임베딩 → 인덱스 검색 → (선택) 보조 컨텍스트 → 프롬프트 조립 → 생성.
//! 보조 컨텍스트는 최선 노력(best-effort)이고, 임베딩/생성 실패는 호출자에게 전달됩니다.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{ContextSource, GenerationParams, GenerationProvider};

use super::index::EmbeddingIndex;
use super::types::RetrievalResult;

// ============================================================================
// Types
// ============================================================================

/// 파이프라인 설정
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 검색할 청크 수
    pub top_k: usize,
    /// 생성 샘플링 파라미터
    pub params: GenerationParams,
    /// 보조 컨텍스트 조회 타임아웃
    pub context_timeout: Duration,
    /// 생성 결과 앞의 프롬프트 반복 제거
    pub strip_echoed_prompt: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            params: GenerationParams::default(),
            context_timeout: Duration::from_secs(30),
            strip_echoed_prompt: true,
        }
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            top_k: settings.top_k,
            params: GenerationParams {
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
            },
            context_timeout: settings.context_timeout,
            strip_echoed_prompt: settings.strip_echoed_prompt,
        }
    }
}

/// 답변에 사용된 청크 출처
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    /// 인덱스 내 위치
    pub index: usize,
    pub page_number: usize,
    pub score: f32,
}

/// 생성된 답변과 근거
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// 생성 모델에 전달된 프롬프트
    pub prompt: String,
    pub sources: Vec<SourceRef>,
}

// ============================================================================
// RetrievalPipeline
// ============================================================================

/// 검색 증강 생성 파이프라인
///
/// 인덱스는 호출마다 `&EmbeddingIndex`로 빌려오므로
/// 여러 질의를 같은 인덱스에 대해 동시에 실행할 수 있습니다.
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    context_source: Option<Arc<dyn ContextSource>>,
    config: PipelineConfig,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        config: PipelineConfig,
    ) -> Result<Self> {
        if config.top_k == 0 {
            return Err(RagError::invalid("top_k must be positive"));
        }
        Ok(Self {
            embedder,
            generator,
            context_source: None,
            config,
        })
    }

    /// 보조 컨텍스트 소스 지정
    pub fn with_context_source(mut self, source: Option<Arc<dyn ContextSource>>) -> Self {
        self.context_source = source;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 질의와 가장 유사한 청크 검색 (생성 없음)
    pub async fn retrieve<'a>(
        &self,
        query: &str,
        index: &'a EmbeddingIndex,
    ) -> Result<Vec<RetrievalResult<'a>>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid("query must not be empty"));
        }

        let query_vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        index.query(&query_vector, self.config.top_k)
    }

    /// 질의에 대한 답변 텍스트
    pub async fn answer(&self, query: &str, index: &EmbeddingIndex) -> Result<String> {
        Ok(self.answer_with_sources(query, index).await?.text)
    }

    /// 질의에 대한 답변 + 사용된 프롬프트와 출처
    pub async fn answer_with_sources(&self, query: &str, index: &EmbeddingIndex) -> Result<Answer> {
        // 1. 검색
        let results = self.retrieve(query, index).await?;
        tracing::debug!("Retrieved {} chunks for query", results.len());

        // 2. 보조 컨텍스트 (실패 시 빈 문자열)
        let supplementary = self.supplementary_context(query).await;

        // 3. 프롬프트 조립
        let chunk_texts: Vec<&str> = results.iter().map(|r| r.record.chunk.text.as_str()).collect();
        let prompt = format_prompt(query, &chunk_texts, &supplementary);

        // 4. 생성
        let output = self
            .generator
            .generate(&prompt, &self.config.params)
            .await
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        let text = if self.config.strip_echoed_prompt {
            strip_echoed_prompt(&output, &prompt)
        } else {
            output.trim().to_string()
        };

        if text.is_empty() {
            return Err(RagError::Generation(format!(
                "{} returned an empty answer",
                self.generator.name()
            )));
        }

        let sources = results
            .iter()
            .map(|r| SourceRef {
                index: r.index,
                page_number: r.record.chunk.page_number,
                score: r.score,
            })
            .collect();

        Ok(Answer {
            text,
            prompt,
            sources,
        })
    }

    /// 보조 컨텍스트 조회 (타임아웃/실패는 경고 후 빈 문자열)
    async fn supplementary_context(&self, query: &str) -> String {
        let Some(source) = &self.context_source else {
            return String::new();
        };

        let result = match tokio::time::timeout(self.config.context_timeout, source.fetch(query)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RagError::ContextUnavailable(format!("{:#}", e))),
            Err(_) => Err(RagError::ContextUnavailable(format!(
                "timed out after {:?}",
                self.config.context_timeout
            ))),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("{}; continuing without it", e);
            String::new()
        })
    }
}

// ============================================================================
// Prompt Helpers
// ============================================================================

/// 고정 템플릿으로 프롬프트 조립
///
/// 섹션 순서: 검색된 청크(글머리표) → 보조 컨텍스트 → 질의
pub fn format_prompt(query: &str, chunk_texts: &[&str], supplementary: &str) -> String {
    let context = chunk_texts
        .iter()
        .map(|text| format!("- {}", text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following context items, please answer the query:\n\
         {}\n\
         \n\
         Additional context:\n\
         {}\n\
         \n\
         User query: {}\n\
         Answer:",
        context, supplementary, query
    )
}

/// 생성 결과가 프롬프트로 시작하면 그 부분을 제거
pub fn strip_echoed_prompt(output: &str, prompt: &str) -> String {
    output
        .strip_prefix(prompt)
        .unwrap_or(output)
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::embedding::HashingEmbedding;
    use crate::knowledge::types::{Chunk, EmbeddingRecord};

    /// 프롬프트를 기록하고 고정 답변을 반환
    struct FakeGenerator {
        reply: Reply,
        prompts: Mutex<Vec<String>>,
    }

    enum Reply {
        Fixed(&'static str),
        EchoPrompt(&'static str),
        Fail,
    }

    impl FakeGenerator {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(vec![]),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeGenerator {
        async fn generate(&self, prompt: &str, _params: &GenerationParams) -> AnyResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Reply::Fixed(text) => Ok(text.to_string()),
                Reply::EchoPrompt(answer) => Ok(format!("{}{}", prompt, answer)),
                Reply::Fail => anyhow::bail!("backend crashed"),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FixedContext(&'static str);

    #[async_trait]
    impl ContextSource for FixedContext {
        async fn fetch(&self, _query: &str) -> AnyResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingContext;

    #[async_trait]
    impl ContextSource for FailingContext {
        async fn fetch(&self, _query: &str) -> AnyResult<String> {
            anyhow::bail!("network unreachable")
        }
    }

    struct SlowContext;

    #[async_trait]
    impl ContextSource for SlowContext {
        async fn fetch(&self, _query: &str) -> AnyResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    fn embedder() -> Arc<HashingEmbedding> {
        Arc::new(HashingEmbedding::new(256).unwrap())
    }

    fn index() -> EmbeddingIndex {
        let embedder = embedder();
        let texts = [
            (1, "Protein is made of amino acids."),
            (2, "Vitamin C is found in citrus fruit."),
            (3, "Calcium supports bone health."),
        ];
        let records = texts
            .iter()
            .map(|(page, text)| EmbeddingRecord {
                chunk: Chunk::from_text(*page, text.to_string()),
                vector: embedder.vectorize(text),
            })
            .collect();
        EmbeddingIndex::from_records(records).unwrap()
    }

    fn config(top_k: usize) -> PipelineConfig {
        PipelineConfig {
            top_k,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_answer_with_sources() {
        let generator = FakeGenerator::new(Reply::Fixed("  Citrus fruit.  "));
        let pipeline = RetrievalPipeline::new(embedder(), generator.clone(), config(2)).unwrap();

        let answer = pipeline
            .answer_with_sources("Where is vitamin C found?", &index())
            .await
            .unwrap();

        assert_eq!(answer.text, "Citrus fruit.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].page_number, 2);
        assert!(answer.sources[0].score >= answer.sources[1].score);
        assert_eq!(answer.prompt, generator.last_prompt());
        assert!(answer.prompt.contains("- Vitamin C is found in citrus fruit."));
        assert!(answer.prompt.ends_with("User query: Where is vitamin C found?\nAnswer:"));
    }

    #[tokio::test]
    async fn test_failing_context_degrades_gracefully() {
        let generator = FakeGenerator::new(Reply::Fixed("Amino acids."));
        let pipeline = RetrievalPipeline::new(embedder(), generator.clone(), config(1))
            .unwrap()
            .with_context_source(Some(Arc::new(FailingContext)));

        let text = pipeline.answer("What is protein made of?", &index()).await.unwrap();
        assert_eq!(text, "Amino acids.");
        assert!(generator.last_prompt().contains("Additional context:\n\n"));
    }

    #[tokio::test]
    async fn test_slow_context_times_out() {
        let generator = FakeGenerator::new(Reply::Fixed("Bones."));
        let pipeline = RetrievalPipeline::new(
            embedder(),
            generator.clone(),
            PipelineConfig {
                top_k: 1,
                context_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .unwrap()
        .with_context_source(Some(Arc::new(SlowContext)));

        let text = pipeline.answer("calcium", &index()).await.unwrap();
        assert_eq!(text, "Bones.");
        assert!(!generator.last_prompt().contains("too late"));
    }

    #[tokio::test]
    async fn test_context_included_in_prompt() {
        let generator = FakeGenerator::new(Reply::Fixed("ok"));
        let pipeline = RetrievalPipeline::new(embedder(), generator.clone(), config(1))
            .unwrap()
            .with_context_source(Some(Arc::new(FixedContext("Citrus includes oranges."))));

        pipeline.answer("vitamin C", &index()).await.unwrap();
        assert!(generator
            .last_prompt()
            .contains("Additional context:\nCitrus includes oranges.\n"));
    }

    #[tokio::test]
    async fn test_echoed_prompt_stripped() {
        let generator = FakeGenerator::new(Reply::EchoPrompt(" Calcium helps bones."));
        let pipeline = RetrievalPipeline::new(embedder(), generator, config(1)).unwrap();

        let text = pipeline.answer("calcium", &index()).await.unwrap();
        assert_eq!(text, "Calcium helps bones.");
    }

    #[tokio::test]
    async fn test_echo_kept_when_stripping_disabled() {
        let generator = FakeGenerator::new(Reply::EchoPrompt(" Calcium helps bones."));
        let pipeline = RetrievalPipeline::new(
            embedder(),
            generator,
            PipelineConfig {
                top_k: 1,
                strip_echoed_prompt: false,
                ..Default::default()
            },
        )
        .unwrap();

        let text = pipeline.answer("calcium", &index()).await.unwrap();
        assert!(text.starts_with("Based on the following context items"));
    }

    #[tokio::test]
    async fn test_generation_failure_surfaces() {
        let generator = FakeGenerator::new(Reply::Fail);
        let pipeline = RetrievalPipeline::new(embedder(), generator, config(1)).unwrap();

        match pipeline.answer("calcium", &index()).await {
            Err(RagError::Generation(msg)) => assert!(msg.contains("backend crashed")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_answer_is_error() {
        let generator = FakeGenerator::new(Reply::Fixed("   "));
        let pipeline = RetrievalPipeline::new(embedder(), generator, config(1)).unwrap();
        assert!(matches!(
            pipeline.answer("calcium", &index()).await,
            Err(RagError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_index_still_answers() {
        let generator = FakeGenerator::new(Reply::Fixed("I don't know."));
        let pipeline = RetrievalPipeline::new(embedder(), generator, config(3)).unwrap();

        let answer = pipeline
            .answer_with_sources("anything", &EmbeddingIndex::empty())
            .await
            .unwrap();
        assert!(answer.sources.is_empty());
        assert_eq!(answer.text, "I don't know.");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let generator = FakeGenerator::new(Reply::Fixed("ok"));
        let pipeline = RetrievalPipeline::new(embedder(), generator, config(1)).unwrap();
        assert!(matches!(
            pipeline.answer("   ", &index()).await,
            Err(RagError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let generator = FakeGenerator::new(Reply::Fixed("ok"));
        assert!(RetrievalPipeline::new(embedder(), generator, config(0)).is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            top_k: 7,
            max_tokens: 128,
            strip_echoed_prompt: false,
            ..Default::default()
        };
        let config = PipelineConfig::from(&settings);
        assert_eq!(config.top_k, 7);
        assert_eq!(config.params.max_tokens, 128);
        assert!(!config.strip_echoed_prompt);
    }

    #[test]
    fn test_format_prompt_sections_in_order() {
        let prompt = format_prompt("Q?", &["first", "second"], "extra");
        assert_eq!(
            prompt,
            "Based on the following context items, please answer the query:\n\
             - first\n\
             - second\n\
             \n\
             Additional context:\n\
             extra\n\
             \n\
             User query: Q?\n\
             Answer:"
        );
    }

    #[test]
    fn test_strip_echoed_prompt() {
        assert_eq!(strip_echoed_prompt("PROMPT answer", "PROMPT"), "answer");
        assert_eq!(strip_echoed_prompt("answer only", "PROMPT"), "answer only");
        // 접두어가 아닌 위치의 프롬프트는 건드리지 않음
        assert_eq!(strip_echoed_prompt("x PROMPT", "PROMPT"), "x PROMPT");
    }
}
