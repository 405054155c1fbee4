//! Knowledge 모듈 - 페이지 텍스트에서 검색 가능한 지식까지
//!
//! - Segmenter: 텍스트 정규화 + 문장 분리
//! - Chunker: 문장 묶음 청크 생성 + 짧은 청크 필터링
//! - Index: 인메모리 임베딩 인덱스 (내적 Top-K)
//! - Store: CSV 기반 인덱스 저장/로드
//! - Pipeline: 검색 → 프롬프트 조립 → 답변 생성

mod chunker;
mod index;
mod pipeline;
mod segmenter;
pub mod store;
mod types;

// Re-exports
pub use chunker::{build_chunks, group_sentences, join_sentences, ChunkConfig, SentenceChunker};
pub use index::{dot_product, EmbeddingIndex, SharedIndex};
pub use pipeline::{
    format_prompt, strip_echoed_prompt, Answer, PipelineConfig, RetrievalPipeline, SourceRef,
};
pub use segmenter::{normalize_text, segment};
pub use store::{load_from_path, save_to_path};
pub use types::{
    approx_token_count, Chunk, EmbeddingRecord, Page, RetrievalResult, CHARS_PER_TOKEN,
};
