//! 공용 데이터 타입
//!
//! 수집 → 청킹 → 인덱싱 → 검색 단계가 공유하는 엔티티입니다.
//! 단계 간 필드 구성이 고정되어 있어 스키마가 어긋나지 않습니다.

/// 문자 수 → 토큰 수 근사 비율 (1 토큰 ≈ 4 문자)
pub const CHARS_PER_TOKEN: f64 = 4.0;

// ============================================================================
// Page
// ============================================================================

/// 문서 리더가 생성한 페이지 단위 텍스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 원본 문서 식별자 (파일 경로 등)
    pub document_id: String,
    /// 페이지 번호 (1부터 시작)
    pub page_number: usize,
    /// 추출된 원문 텍스트
    pub raw_text: String,
}

impl Page {
    pub fn new(document_id: impl Into<String>, page_number: usize, raw_text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            page_number,
            raw_text: raw_text.into(),
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크
///
/// `char_count`는 `text`의 문자 수, `word_count`는 공백 구분 단어 수,
/// `approx_token_count`는 `char_count / 4`입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 출처 페이지 번호
    pub page_number: usize,
    /// 정규화된 청크 텍스트
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub approx_token_count: f64,
}

impl Chunk {
    /// 정규화된 텍스트로부터 통계를 계산하여 생성
    pub fn from_text(page_number: usize, text: String) -> Self {
        let char_count = text.chars().count();
        let word_count = text.split_whitespace().count();

        Self {
            page_number,
            text,
            char_count,
            word_count,
            approx_token_count: approx_token_count(char_count),
        }
    }
}

/// 문자 수로 토큰 수 근사
#[inline]
pub fn approx_token_count(char_count: usize) -> f64 {
    char_count as f64 / CHARS_PER_TOKEN
}

// ============================================================================
// EmbeddingRecord / RetrievalResult
// ============================================================================

/// 청크와 임베딩 벡터 쌍
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// 검색 결과 (인덱스 위치 + 스코어)
#[derive(Debug, Clone, Copy)]
pub struct RetrievalResult<'a> {
    /// 내적 유사도
    pub score: f32,
    /// 인덱스 내 삽입 순서 위치
    pub index: usize,
    pub record: &'a EmbeddingRecord,
}
