//! CLI 모듈
//!
//! pagerag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{get_data_dir, ContextKind, Device, EmbedderKind, Settings};
use crate::embedding::create_embedder;
use crate::extractor::{DocumentReader, PageStats, ReaderConfig};
use crate::generation::{create_context_source, create_generator};
use crate::knowledge::{
    load_from_path, save_to_path, Answer, ChunkConfig, EmbeddingIndex, PipelineConfig,
    RetrievalPipeline, SentenceChunker,
};

/// 답변 출력 줄 너비
const WRAP_WIDTH: usize = 80;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pagerag")]
#[command(version, about = "문서 페이지 기반 로컬 RAG 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 인덱스 CSV 파일 경로
    #[arg(long, global = true, env = "PAGERAG_INDEX")]
    pub index: Option<PathBuf>,

    /// Ollama 서버 주소
    #[arg(long, global = true, env = "PAGERAG_OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// 임베딩 모델
    #[arg(long, global = true, env = "PAGERAG_EMBED_MODEL")]
    pub embed_model: Option<String>,

    /// 생성 모델
    #[arg(long, global = true, env = "PAGERAG_MODEL")]
    pub model: Option<String>,

    /// 보조 컨텍스트용 OpenAI 모델
    #[arg(long, global = true, env = "PAGERAG_OPENAI_MODEL")]
    pub openai_model: Option<String>,

    /// 모델 실행 장치
    #[arg(long, global = true, value_enum, env = "PAGERAG_DEVICE")]
    pub device: Option<Device>,

    /// 임베딩 백엔드
    #[arg(long, global = true, value_enum, env = "PAGERAG_EMBEDDER")]
    pub embedder: Option<EmbedderKind>,

    /// 보조 컨텍스트 소스
    #[arg(long, global = true, value_enum, env = "PAGERAG_CONTEXT")]
    pub context: Option<ContextKind>,

    /// 동시에 임베딩할 배치 수
    #[arg(long, global = true, env = "PAGERAG_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// 샘플링 온도
    #[arg(long, global = true, env = "PAGERAG_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// 최대 생성 토큰 수
    #[arg(long, global = true, env = "PAGERAG_MAX_TOKENS")]
    pub max_tokens: Option<usize>,

    /// HTTP 요청 타임아웃 (초)
    #[arg(long, global = true, env = "PAGERAG_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// 보조 컨텍스트 타임아웃 (초)
    #[arg(long, global = true, env = "PAGERAG_CONTEXT_TIMEOUT")]
    pub context_timeout: Option<u64>,

    /// 생성 결과 앞에 반복된 프롬프트를 제거하지 않음
    #[arg(long, global = true)]
    pub keep_echo: bool,

    /// 디버그 로그 출력
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더에서 인덱스 생성
    Build {
        /// 문서 파일 또는 폴더 경로
        path: PathBuf,

        /// 청크당 문장 수
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 최소 토큰 수 (이하인 청크는 제외)
        #[arg(long)]
        min_tokens: Option<usize>,

        /// 임베딩 배치 크기
        #[arg(long, env = "PAGERAG_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// 짧은 페이지용 청킹 프리셋 (10 문장 / 30 토큰)
        #[arg(long)]
        small_pages: bool,

        /// 특정 확장자만 읽기 (예: --ext pdf --ext md)
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// 질문에 답변 생성
    Ask {
        /// 질문
        query: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long, env = "PAGERAG_TOP_K")]
        top_k: Option<usize>,

        /// 사용된 출처 출력
        #[arg(long)]
        sources: bool,
    },

    /// 유사 청크 검색 (생성 없음)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long, env = "PAGERAG_TOP_K")]
        top_k: Option<usize>,
    },

    /// 상태 확인
    Status,
}

impl Cli {
    /// 플래그/환경변수를 반영한 설정
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();

        if let Some(ref path) = self.index {
            settings.index_path = path.clone();
        }
        if let Some(ref url) = self.ollama_url {
            settings.ollama_url = url.clone();
        }
        if let Some(ref model) = self.embed_model {
            settings.embed_model = model.clone();
        }
        if let Some(ref model) = self.model {
            settings.generation_model = model.clone();
        }
        if let Some(ref model) = self.openai_model {
            settings.openai_model = model.clone();
        }
        if let Some(device) = self.device {
            settings.device = device;
        }
        if let Some(embedder) = self.embedder {
            settings.embedder = embedder;
        }
        if let Some(context) = self.context {
            settings.context = context;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(secs) = self.request_timeout {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.context_timeout {
            settings.context_timeout = Duration::from_secs(secs);
        }
        if self.keep_echo {
            settings.strip_echoed_prompt = false;
        }

        match &self.command {
            Commands::Build { batch_size: Some(batch_size), .. } => {
                settings.batch_size = *batch_size;
            }
            Commands::Ask { top_k: Some(k), .. } | Commands::Search { top_k: Some(k), .. } => {
                settings.top_k = *k;
            }
            _ => {}
        }

        settings
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings();
    settings.validate().context("잘못된 설정")?;

    match cli.command {
        Commands::Build {
            path,
            chunk_size,
            min_tokens,
            small_pages,
            extensions,
            ..
        } => {
            let mut chunk_config = if small_pages {
                ChunkConfig::for_small_pages()
            } else {
                ChunkConfig::default()
            };
            if let Some(size) = chunk_size {
                chunk_config.chunk_size = size;
            }
            if let Some(min) = min_tokens {
                chunk_config.min_token_length = min;
            }
            cmd_build(&settings, &path, chunk_config, extensions).await
        }
        Commands::Ask { query, sources, .. } => cmd_ask(&settings, &query, sources).await,
        Commands::Search { query, .. } => cmd_search(&settings, &query).await,
        Commands::Status => cmd_status(&settings),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 생성 명령어 (build)
///
/// 문서 읽기 → 청킹 → 임베딩 → CSV 저장
async fn cmd_build(
    settings: &Settings,
    path: &Path,
    chunk_config: ChunkConfig,
    extensions: Vec<String>,
) -> Result<()> {
    let reader = DocumentReader::new(ReaderConfig {
        extensions,
        ..Default::default()
    });

    println!("[*] 문서 읽는 중: {}", path.display());
    let pages = reader.read(path).await.context("문서 읽기 실패")?;

    if pages.is_empty() {
        bail!("읽을 수 있는 페이지가 없습니다: {}", path.display());
    }

    let stats = PageStats::total(&pages);
    println!("[*] 페이지: {}", stats.page_number);
    println!(
        "    문자: {}, 단어: {}, 토큰(추정): {:.0}",
        stats.char_count, stats.word_count, stats.approx_token_count
    );

    let chunker = SentenceChunker::new(chunk_config).context("잘못된 청킹 설정")?;
    let chunks = chunker.chunk_pages(&pages).context("청킹 실패")?;
    println!(
        "[*] 청크: {} (문장 {}개 단위, 최소 토큰 {})",
        chunks.len(),
        chunker.config().chunk_size,
        chunker.config().min_token_length
    );

    if chunks.is_empty() {
        println!("[!] 최소 토큰 수를 넘는 청크가 없습니다. 빈 인덱스를 저장합니다.");
    }

    let embedder = create_embedder(settings).context("임베딩 프로바이더 생성 실패")?;
    println!("[*] 임베딩 생성 중 ({})...", embedder.name());

    let index = EmbeddingIndex::build_concurrent(
        chunks,
        embedder.as_ref(),
        settings.batch_size,
        settings.concurrency,
    )
    .await
    .context("임베딩 실패")?;

    save_to_path(&index, &settings.index_path).context("인덱스 저장 실패")?;

    println!(
        "[OK] 인덱스 저장 완료: {} 레코드, 차원 {}",
        index.len(),
        index.dimension()
    );
    println!("     경로: {}", settings.index_path.display());

    Ok(())
}

/// 답변 명령어 (ask)
async fn cmd_ask(settings: &Settings, query: &str, show_sources: bool) -> Result<()> {
    let index = load_index(&settings.index_path)?;

    let pipeline = RetrievalPipeline::new(
        create_embedder(settings)?,
        create_generator(settings)?,
        PipelineConfig::from(settings),
    )?
    .with_context_source(create_context_source(settings)?);

    // stdout에는 답변만 출력 (진행 상황은 stderr 로그)
    tracing::info!("Answering: {:?}", query);

    let answer = pipeline
        .answer_with_sources(query, &index)
        .await
        .context("답변 생성 실패")?;

    print!("{}", render_answer(&answer, show_sources));

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(settings: &Settings, query: &str) -> Result<()> {
    let index = load_index(&settings.index_path)?;
    let embedder = create_embedder(settings)?;

    println!("[*] 검색 중: \"{}\"", query);

    let query_vector = embedder.embed(query).await.context("질의 임베딩 실패")?;
    let results = index
        .query(&query_vector, settings.top_k)
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] 페이지 {} (#{})",
            i + 1,
            result.score,
            result.record.chunk.page_number,
            result.index
        );
        println!("   내용: {}", truncate_text(&result.record.chunk.text, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(settings: &Settings) -> Result<()> {
    println!("pagerag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!("[*] 인덱스 경로: {}", settings.index_path.display());
    println!(
        "[*] 모델: 임베딩 {:?}/{}, 생성 {}",
        settings.embedder, settings.embed_model, settings.generation_model
    );

    if !settings.index_path.exists() {
        println!("[!] 인덱스: 없음");
        println!("    생성: pagerag build <path>");
        return Ok(());
    }

    let size = std::fs::metadata(&settings.index_path)
        .map(|m| m.len() as usize)
        .unwrap_or(0);

    match load_from_path(&settings.index_path) {
        Ok(index) => {
            println!("[OK] 인덱스: {} 레코드, 차원 {}", index.len(), index.dimension());
            println!("     파일 크기: {}", format_bytes(size));
        }
        Err(e) => {
            println!("[!] 인덱스 읽기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 저장된 인덱스 로드 (없으면 안내 메시지와 함께 실패)
fn load_index(path: &Path) -> Result<EmbeddingIndex> {
    if !path.exists() {
        bail!(
            "인덱스 파일이 없습니다: {}\n\n\
             먼저 인덱스를 생성하세요:\n  \
             pagerag build <path>",
            path.display()
        );
    }

    let index = load_from_path(path).context("인덱스 로드 실패")?;
    tracing::debug!("Loaded {} records from {:?}", index.len(), path);
    Ok(index)
}

/// 답변 출력 형식 (80열 줄바꿈 + 선택적 출처 목록)
fn render_answer(answer: &Answer, show_sources: bool) -> String {
    let mut out = wrap_text(&answer.text, WRAP_WIDTH);
    out.push('\n');

    if show_sources {
        out.push_str(&format!("\n출처 ({} 건):\n", answer.sources.len()));
        for source in &answer.sources {
            out.push_str(&format!(
                "    #{:<5} 페이지 {:<5} [점수: {:.4}]\n",
                source.index, source.page_number, source.score
            ));
        }
    }

    out
}

/// 단어 단위 줄바꿈 (기존 줄바꿈 유지, 긴 단어는 자르지 않음)
fn wrap_text(text: &str, width: usize) -> String {
    text.lines()
        .map(|line| {
            let mut wrapped = String::new();
            let mut current = 0;

            for word in line.split_whitespace() {
                let len = word.chars().count();
                if current > 0 && current + 1 + len > width {
                    wrapped.push('\n');
                    current = 0;
                } else if current > 0 {
                    wrapped.push(' ');
                    current += 1;
                }
                wrapped.push_str(word);
                current += len;
            }

            wrapped
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
