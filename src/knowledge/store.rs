//! Index Store - 인덱스 CSV 직렬화
//!
//! 레코드 하나가 한 행입니다. 컬럼:
//! `page_number, sentence_chunk, chunk_char_count, chunk_word_count, chunk_token_count, embedding`
//!
//! 임베딩은 `[0.1 -0.2 ...]` 형식이며 f32의 최단 왕복 표현으로 기록되어
//! 다시 읽어도 값이 바뀌지 않습니다.

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

use super::index::EmbeddingIndex;
use super::types::{Chunk, EmbeddingRecord};

/// CSV 헤더 (순서대로 기록)
pub const COLUMNS: [&str; 6] = [
    "page_number",
    "sentence_chunk",
    "chunk_char_count",
    "chunk_word_count",
    "chunk_token_count",
    "embedding",
];

// ============================================================================
// Save
// ============================================================================

/// 인덱스를 CSV로 기록
pub fn save<W: Write>(index: &EmbeddingIndex, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(COLUMNS)?;

    for record in index.records() {
        let chunk = &record.chunk;
        csv_writer.write_record([
            chunk.page_number.to_string(),
            chunk.text.clone(),
            chunk.char_count.to_string(),
            chunk.word_count.to_string(),
            chunk.approx_token_count.to_string(),
            encode_vector(&record.vector),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// 인덱스를 파일로 저장
///
/// 임시 파일에 먼저 쓰고 rename하므로 실패해도 기존 파일이 손상되지 않습니다.
pub fn save_to_path(index: &EmbeddingIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path);
    let result = fs::File::create(&tmp_path)
        .map_err(RagError::from)
        .and_then(|file| save(index, BufWriter::new(file)));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    tracing::info!("Saved index ({} records) to {:?}", index.len(), path);
    Ok(())
}

// ============================================================================
// Load
// ============================================================================

/// CSV에서 인덱스 복원
///
/// 컬럼은 헤더 이름으로 찾으므로 순서나 추가 컬럼(예: pandas 인덱스)은 무관합니다.
pub fn load<R: Read>(reader: R) -> Result<EmbeddingIndex> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut positions = [0usize; 6];
    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| RagError::corrupt(0, column, "missing column"))?;
    }
    let [page_col, text_col, char_col, word_col, token_col, vector_col] = positions;

    let mut records = Vec::new();
    let mut dimension: Option<usize> = None;

    for (i, row) in csv_reader.records().enumerate() {
        let row_no = i + 1;
        let row = row.map_err(|e| RagError::corrupt(row_no, "row", e.to_string()))?;
        let field = |col: usize, name: &'static str| {
            row.get(col)
                .ok_or_else(|| RagError::corrupt(row_no, name, "missing value"))
        };

        let vector = decode_vector(field(vector_col, "embedding")?)
            .map_err(|reason| RagError::corrupt(row_no, "embedding", reason))?;
        match dimension {
            None => dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(RagError::corrupt(
                    row_no,
                    "embedding",
                    format!("dimension {} differs from {}", vector.len(), d),
                ));
            }
            Some(_) => {}
        }

        let chunk = Chunk {
            page_number: parse_field(field(page_col, "page_number")?, row_no, "page_number")?,
            text: field(text_col, "sentence_chunk")?.to_string(),
            char_count: parse_field(field(char_col, "chunk_char_count")?, row_no, "chunk_char_count")?,
            word_count: parse_field(field(word_col, "chunk_word_count")?, row_no, "chunk_word_count")?,
            approx_token_count: parse_field(
                field(token_col, "chunk_token_count")?,
                row_no,
                "chunk_token_count",
            )?,
        };

        records.push(EmbeddingRecord { chunk, vector });
    }

    let index = EmbeddingIndex::from_records(records)?;
    tracing::debug!(
        "Loaded index: {} records, dimension {}",
        index.len(),
        index.dimension()
    );
    Ok(index)
}

/// 파일에서 인덱스 로드
pub fn load_from_path(path: &Path) -> Result<EmbeddingIndex> {
    let file = fs::File::open(path)?;
    let index = load(BufReader::new(file))?;
    tracing::info!("Loaded index ({} records) from {:?}", index.len(), path);
    Ok(index)
}

// ============================================================================
// Vector Encoding
// ============================================================================

/// 벡터 → `[v1 v2 ...]`
pub fn encode_vector(vector: &[f32]) -> String {
    let body: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", body.join(" "))
}

/// `[v1 v2 ...]` → 벡터
///
/// 쉼표 구분(`[v1, v2]`)도 허용합니다. 잘못된 값이 하나라도 있으면 실패합니다.
pub fn decode_vector(field: &str) -> std::result::Result<Vec<f32>, String> {
    let inner = field
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("expected bracketed vector, got `{}`", preview(field)))?;

    let vector = inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(parse_component)
        .collect::<std::result::Result<Vec<f32>, String>>()?;

    if vector.is_empty() {
        return Err("empty vector".to_string());
    }
    Ok(vector)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 벡터 성분 파싱 (범위 초과로 생긴 inf는 거부, 명시적 inf/NaN은 허용)
fn parse_component(token: &str) -> std::result::Result<f32, String> {
    let value = token
        .parse::<f32>()
        .map_err(|_| format!("not a number: `{}`", token))?;

    if !value.is_finite() {
        let spelled = token.trim_start_matches(['+', '-']).to_ascii_lowercase();
        if !matches!(spelled.as_str(), "inf" | "infinity" | "nan") {
            return Err(format!("out of f32 range: `{}`", token));
        }
    }
    Ok(value)
}

fn parse_field<T: std::str::FromStr>(value: &str, row: usize, field: &'static str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| RagError::corrupt(row, field, format!("cannot parse `{}`", preview(value))))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 에러 메시지용 앞부분 (UTF-8 안전)
fn preview(value: &str) -> String {
    const MAX_CHARS: usize = 40;
    if value.chars().count() <= MAX_CHARS {
        value.to_string()
    } else {
        let head: String = value.chars().take(MAX_CHARS).collect();
        format!("{}...", head)
    }
}

// ============================================================================
// Tests
// ============================================================================
