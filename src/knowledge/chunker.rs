//! Sentence Chunking Module
//!
//! 문장 목록을 고정 개수 단위로 묶어 청크를 만듭니다.
//! 청크마다 문자/단어/토큰 통계를 계산하고 너무 작은 청크는 버립니다.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{RagError, Result};

use super::segmenter::segment;
use super::types::{Chunk, Page};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkConfig {
    /// 청크 당 문장 수
    pub chunk_size: usize,
    /// 최소 토큰 수 (이 값을 초과해야 유지)
    pub min_token_length: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 30,
            min_token_length: 3,
        }
    }
}

impl ChunkConfig {
    /// 페이지가 짧은 문서용 설정 (작은 청크, 엄격한 필터)
    pub fn for_small_pages() -> Self {
        Self {
            chunk_size: 10,
            min_token_length: 30,
        }
    }
}

// ============================================================================
// Chunk Building
// ============================================================================

/// 문장 목록을 최대 `chunk_size`개씩 연속 그룹으로 분할
///
/// 마지막 그룹은 더 작을 수 있습니다 (패딩/삭제 없음).
pub fn group_sentences<S: AsRef<str>>(sentences: &[S], chunk_size: usize) -> Result<Vec<&[S]>> {
    if chunk_size == 0 {
        return Err(RagError::invalid("chunk_size must be positive"));
    }
    Ok(sentences.chunks(chunk_size).collect())
}

/// 문장 그룹을 하나의 청크 텍스트로 결합
///
/// 구분자 없이 이어붙인 뒤 연속 공백을 하나로 줄이고,
/// 마침표 바로 뒤에 대문자가 붙은 경우 공백을 넣습니다.
pub fn join_sentences<S: AsRef<str>>(group: &[S]) -> String {
    let joined: String = group.iter().map(AsRef::as_ref).collect();
    let collapsed = collapse_spaces(&joined);

    sentence_gap_re()
        .replace_all(collapsed.trim(), ". $1")
        .into_owned()
}

/// 문장 목록으로 청크 생성
///
/// `approx_token_count`가 `min_token_length`보다 엄격히 큰 청크만 유지합니다.
pub fn build_chunks<S: AsRef<str>>(
    page_number: usize,
    sentences: &[S],
    chunk_size: usize,
    min_token_length: usize,
) -> Result<Vec<Chunk>> {
    let groups = group_sentences(sentences, chunk_size)?;
    let total = groups.len();

    let chunks: Vec<Chunk> = groups
        .into_iter()
        .map(|group| Chunk::from_text(page_number, join_sentences(group)))
        .filter(|chunk| chunk.approx_token_count > min_token_length as f64)
        .collect();

    if chunks.len() < total {
        tracing::debug!(
            "Page {}: dropped {} of {} chunks below {} tokens",
            page_number,
            total - chunks.len(),
            total,
            min_token_length
        );
    }

    Ok(chunks)
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 페이지 → 문장 → 청크 변환기
#[derive(Debug, Clone, Default)]
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성 (청크 크기 0은 거부)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::invalid("chunk_size must be positive"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 단일 페이지 청킹
    pub fn chunk_page(&self, page: &Page) -> Result<Vec<Chunk>> {
        let sentences = segment(&page.raw_text);
        build_chunks(
            page.page_number,
            &sentences,
            self.config.chunk_size,
            self.config.min_token_length,
        )
    }

    /// 여러 페이지 청킹 (입력 순서 유지)
    pub fn chunk_pages(&self, pages: &[Page]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for page in pages {
            chunks.extend(self.chunk_page(page)?);
        }

        tracing::info!(
            "Chunked {} pages into {} chunks (chunk_size={}, min_tokens={})",
            pages.len(),
            chunks.len(),
            self.config.chunk_size,
            self.config.min_token_length
        );
        Ok(chunks)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `.X` (마침표 + 대문자) 패턴
fn sentence_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([A-Z])").expect("Invalid regex"))
}

/// 연속된 공백(스페이스)을 하나로 축약
fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;

    for c in text.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
