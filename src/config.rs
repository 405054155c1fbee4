//! 런타임 설정
//!
//! 데이터 디렉토리, 모델 백엔드, 배치/검색 파라미터를 한곳에 모읍니다.
//! 연산 장치(Device)는 전역 상태가 아니라 이 설정을 통해 프로바이더 생성자로 전달됩니다.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;

/// 인덱스 파일 기본 이름
pub const INDEX_FILE_NAME: &str = "text_chunks_and_embeddings.csv";

/// Ollama 기본 엔드포인트
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.pagerag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pagerag")
}

/// 기본 인덱스 파일 경로
pub fn default_index_path() -> PathBuf {
    get_data_dir().join(INDEX_FILE_NAME)
}

// ============================================================================
// Enums
// ============================================================================

/// 모델 실행 장치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Device {
    /// CPU 전용 (GPU 레이어 오프로드 없음)
    Cpu,
    /// 백엔드 기본값 (가능하면 가속기 사용)
    #[default]
    Gpu,
}

impl Device {
    /// Ollama `num_gpu` 옵션 값 (None = 백엔드 기본값)
    pub fn ollama_num_gpu(self) -> Option<u32> {
        match self {
            Device::Cpu => Some(0),
            Device::Gpu => None,
        }
    }
}

/// 임베딩 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EmbedderKind {
    /// Ollama `/api/embed`
    #[default]
    Ollama,
    /// 오프라인 해싱 임베딩 (결정적)
    Hashing,
}

/// 보조 컨텍스트 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ContextKind {
    /// 사용 안 함
    #[default]
    None,
    /// 로컬 Ollama 생성 모델에 배경 지식 요청
    Ollama,
    /// OpenAI 호환 API에 배경 지식 요청
    Openai,
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// 인덱스 파일 경로
    pub index_path: PathBuf,
    /// Ollama 서버 주소
    pub ollama_url: String,
    /// 임베딩 모델 이름
    pub embed_model: String,
    /// 생성 모델 이름
    pub generation_model: String,
    /// 보조 컨텍스트용 OpenAI 모델 이름
    pub openai_model: String,
    pub device: Device,
    pub embedder: EmbedderKind,
    pub context: ContextKind,
    /// 해싱 임베딩 차원
    pub hashing_dimension: usize,
    /// 임베딩 배치 크기
    pub batch_size: usize,
    /// 동시에 처리할 임베딩 배치 수
    pub concurrency: usize,
    /// 검색 결과 개수
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: usize,
    /// HTTP 요청 타임아웃
    pub request_timeout: Duration,
    /// 보조 컨텍스트 조회 타임아웃
    pub context_timeout: Duration,
    /// 생성 결과 앞에 반복된 프롬프트 제거 여부
    pub strip_echoed_prompt: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generation_model: "gemma2:2b".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            device: Device::default(),
            embedder: EmbedderKind::default(),
            context: ContextKind::default(),
            hashing_dimension: 768,
            batch_size: 32,
            concurrency: 4,
            top_k: 5,
            temperature: 0.7,
            max_tokens: 512,
            request_timeout: Duration::from_secs(120),
            context_timeout: Duration::from_secs(30),
            strip_echoed_prompt: true,
        }
    }
}

impl Settings {
    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.concurrency > 0, "concurrency must be positive");
        anyhow::ensure!(self.top_k > 0, "top_k must be positive");
        anyhow::ensure!(self.max_tokens > 0, "max_tokens must be positive");
        anyhow::ensure!(
            self.hashing_dimension > 0,
            "hashing_dimension must be positive"
        );
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.temperature),
            "temperature must be within 0.0..=2.0"
        );
        Ok(())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// OpenAI API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `PAGERAG_OPENAI_API_KEY` 환경변수
/// 2. `OPENAI_API_KEY` 환경변수
pub fn get_openai_api_key() -> Result<String> {
    for var in ["PAGERAG_OPENAI_API_KEY", "OPENAI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.trim().is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!("API key not found. Set PAGERAG_OPENAI_API_KEY or OPENAI_API_KEY environment variable.")
}

// ============================================================================
// Tests
// ============================================================================
