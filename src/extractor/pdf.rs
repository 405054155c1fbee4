//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트로 전체 텍스트를 뽑은 뒤 폼피드 문자로 페이지를 나눕니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 페이지 구분 문자
const FORM_FEED: char = '\x0c';

/// PDF에서 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 튜플 벡터를 반환합니다. 페이지 번호는 1부터 시작하며,
/// 텍스트가 없는 페이지는 건너뛰지만 번호는 원본 위치를 유지합니다.
pub fn extract_pages_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pages(&text))
}

/// 폼피드 기준 페이지 분리 (빈 페이지 제외, 번호 유지)
pub(crate) fn split_pages(text: &str) -> Vec<(usize, String)> {
    text.split(FORM_FEED)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| (i + 1, page.to_string()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_with_formfeed() {
        let pages = split_pages("Page 1 content\x0cPage 2 content\x0cPage 3 content");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], (1, "Page 1 content".to_string()));
        assert_eq!(pages[2].0, 3);
    }

    #[test]
    fn test_blank_pages_keep_numbering() {
        let pages = split_pages("Cover\x0c  \n \x0cChapter one\x0c");
        let numbers: Vec<usize> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn test_no_separator_is_single_page() {
        let pages = split_pages("Just some text without page breaks");
        assert_eq!(pages, vec![(1, "Just some text without page breaks".to_string())]);
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        assert!(extract_pages_from_pdf(&path).is_err());
    }
}
