//! 문서 읽기 모듈
//!
//! 파일 또는 폴더에서 페이지 단위 텍스트를 읽어옵니다.
//! - 텍스트 파일 (.txt, .md): 파일 전체가 한 페이지
//! - PDF 파일: pdf-extract로 추출 후 폼피드 기준 페이지 분리
//!
//! 폴더는 ignore 크레이트로 재귀 탐색하며 숨김 파일과 .gitignore 대상은 건너뜁니다.

pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use crate::knowledge::{approx_token_count, normalize_text, Page};

// ============================================================================
// Document Kinds
// ============================================================================

/// 지원하는 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// 텍스트 파일 (마크다운 포함)
    Text,
    /// PDF 파일
    Pdf,
}

impl DocumentKind {
    /// 확장자로 문서 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Page Statistics
// ============================================================================

/// 페이지 통계 (리포트용)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageStats {
    pub page_number: usize,
    pub char_count: usize,
    pub word_count: usize,
    pub approx_token_count: f64,
}

impl PageStats {
    pub fn of(page: &Page) -> Self {
        let char_count = page.raw_text.chars().count();
        Self {
            page_number: page.page_number,
            char_count,
            word_count: page.raw_text.split_whitespace().count(),
            approx_token_count: approx_token_count(char_count),
        }
    }

    /// 여러 페이지 통계 합계 (page_number는 페이지 수)
    pub fn total(pages: &[Page]) -> Self {
        pages.iter().map(Self::of).fold(Self::default(), |acc, s| Self {
            page_number: acc.page_number + 1,
            char_count: acc.char_count + s.char_count,
            word_count: acc.word_count + s.word_count,
            approx_token_count: acc.approx_token_count + s.approx_token_count,
        })
    }
}

// ============================================================================
// Document Reader
// ============================================================================

/// 문서 읽기 설정
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 특정 확장자만 읽기 (비어있으면 모든 지원 확장자)
    pub extensions: Vec<String>,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024, // 50MB
            extensions: vec![],
            include_hidden: false,
            respect_gitignore: true,
        }
    }
}

/// 파일/폴더 → 페이지 목록
pub struct DocumentReader {
    config: ReaderConfig,
}

impl DocumentReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// 경로에서 페이지 읽기
    ///
    /// 단일 파일은 실패 시 오류를 반환하고, 폴더 안의 개별 파일 실패는 경고 후 건너뜁니다.
    pub async fn read(&self, path: &Path) -> Result<Vec<Page>> {
        if !path.exists() {
            anyhow::bail!("Path not found: {:?}", path);
        }

        if path.is_file() {
            let kind = DocumentKind::from_path(path)
                .ok_or_else(|| anyhow::anyhow!("Unsupported file type: {:?}", path))?;
            return self.read_file(path, kind).await;
        }

        let files = self.collect_directory(path);
        let mut pages = Vec::new();

        for (file, kind) in files {
            match self.read_file(&file, kind).await {
                Ok(file_pages) => pages.extend(file_pages),
                Err(e) => tracing::warn!("Skipping {:?}: {:#}", file, e),
            }
        }

        tracing::info!("Read {} pages from {:?}", pages.len(), path);
        Ok(pages)
    }

    /// 단일 파일 읽기
    async fn read_file(&self, path: &Path, kind: DocumentKind) -> Result<Vec<Page>> {
        let document_id = path.display().to_string();

        let raw_pages = match kind {
            DocumentKind::Text => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read text file: {:?}", path))?;
                vec![(1, text)]
            }
            DocumentKind::Pdf => {
                // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
                let owned = path.to_path_buf();
                tokio::task::spawn_blocking(move || pdf::extract_pages_from_pdf(&owned))
                    .await
                    .context("PDF extraction task failed")??
            }
        };

        let pages: Vec<Page> = raw_pages
            .into_iter()
            .map(|(number, text)| Page::new(document_id.clone(), number, normalize_text(&text)))
            .filter(|page| !page.raw_text.is_empty())
            .collect();

        tracing::debug!("{:?}: {} pages", path, pages.len());
        Ok(pages)
    }

    /// 폴더 재귀 탐색 (파일명 순 정렬)
    fn collect_directory(&self, root: &Path) -> Vec<(PathBuf, DocumentKind)> {
        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut files = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let Some(kind) = DocumentKind::from_path(path) else {
                continue;
            };

            if self.should_include(path) {
                files.push((path.to_path_buf(), kind));
            }
        }

        tracing::debug!("Collected {} documents from {:?}", files.len(), root);
        files
    }

    /// 크기/확장자 필터
    fn should_include(&self, path: &Path) -> bool {
        if self.config.max_file_size > 0 {
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() > self.config.max_file_size => {
                    tracing::debug!("Skipping large file: {:?} ({} bytes)", path, meta.len());
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read metadata {:?}: {}", path, e);
                    return false;
                }
            }
        }

        if self.config.extensions.is_empty() {
            return true;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

impl Default for DocumentReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
