//! pagerag - 문서 페이지 기반 로컬 RAG 파이프라인
//!
//! 문서를 페이지 단위로 읽어 문장 묶음 청크로 나누고, 임베딩 인덱스를 만든 뒤
//! 질의에 가장 가까운 청크로 프롬프트를 조립해 답변을 생성합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
mod http;
pub mod knowledge;

// Re-exports
pub use config::{get_data_dir, ContextKind, Device, EmbedderKind, Settings};
pub use embedding::{create_embedder, EmbeddingProvider, HashingEmbedding, OllamaEmbedding};
pub use error::{RagError, Result};
pub use extractor::{DocumentReader, PageStats, ReaderConfig};
pub use generation::{
    create_context_source, create_generator, ContextSource, GenerationParams, GenerationProvider,
};
pub use knowledge::{
    segment, Answer, Chunk, ChunkConfig, EmbeddingIndex, EmbeddingRecord, Page, PipelineConfig,
    RetrievalPipeline, RetrievalResult, SentenceChunker, SharedIndex, SourceRef,
};
