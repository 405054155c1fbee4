//! 에러 타입
//!
//! 라이브러리 전 구간에서 사용하는 RAG 에러 분류입니다.
//! CLI 계층은 `anyhow`로 감싸서 컨텍스트를 덧붙입니다.

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 잘못된 인자 (k, 청크 크기, 배치 크기 등)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 임베딩 함수 계약 위반 또는 호출 실패
    #[error("embedding error: {0}")]
    Embedding(String),

    /// 저장된 인덱스 파싱 실패
    #[error("corrupt index at row {row}, field `{field}`: {reason}")]
    CorruptIndex {
        /// 1-based 데이터 행 번호 (헤더 제외)
        row: usize,
        field: &'static str,
        reason: String,
    },

    /// 생성 모델 호출 실패
    #[error("generation error: {0}")]
    Generation(String),

    /// 보조 컨텍스트 조회 실패 (파이프라인 내부에서 흡수됨)
    #[error("supplementary context unavailable: {0}")]
    ContextUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl RagError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupt(row: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self::CorruptIndex {
            row,
            field,
            reason: reason.into(),
        }
    }
}

/// 라이브러리 Result 별칭
pub type Result<T> = std::result::Result<T, RagError>;
