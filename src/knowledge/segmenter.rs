//! 문장 분할
//!
//! 페이지 텍스트를 UAX #29 문장 경계로 나눕니다.
//! ref: https://www.unicode.org/reports/tr29/#Sentence_Boundaries

use unicode_segmentation::UnicodeSegmentation;

/// 페이지 텍스트 정규화 (줄바꿈 → 공백, 앞뒤 공백 제거)
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

/// 페이지 텍스트를 문장 목록으로 분할
///
/// 입력은 먼저 [`normalize_text`]로 정규화됩니다.
/// 각 문장은 앞뒤 공백이 제거되며 빈 문장은 포함되지 않습니다.
pub fn segment(page_text: &str) -> Vec<String> {
    let normalized = normalize_text(page_text);
    if normalized.is_empty() {
        return vec![];
    }

    normalized
        .split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
