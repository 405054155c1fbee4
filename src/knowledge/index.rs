//! Embedding Index - 청크 벡터 인덱스 및 top-k 검색
//!
//! 삽입 순서가 곧 식별자인 (청크, 벡터) 레코드 목록입니다.
//! 인덱스는 한 번에 빌드되고 검색 중에는 읽기 전용입니다.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::{stream, StreamExt, TryStreamExt};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::types::{Chunk, EmbeddingRecord, RetrievalResult};

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// 임베딩 인덱스
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingIndex {
    records: Vec<EmbeddingRecord>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// 빈 인덱스
    pub fn empty() -> Self {
        Self::default()
    }

    /// 레코드 목록으로 인덱스 생성 (차원 일관성 검증)
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dimension = validate_dimensions(records.iter().map(|r| r.vector.as_slice()))?;
        Ok(Self { records, dimension })
    }

    /// 청크를 배치 단위로 임베딩하여 인덱스 빌드 (순차)
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        Self::build_concurrent(chunks, embedder, batch_size, 1).await
    }

    /// 최대 `concurrency`개 배치를 동시에 임베딩하여 인덱스 빌드
    ///
    /// 결과 레코드 순서는 입력 청크 순서와 같습니다.
    /// 한 배치라도 실패하면 전체 빌드가 실패합니다.
    pub async fn build_concurrent(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
        concurrency: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::invalid("batch_size must be positive"));
        }
        if chunks.is_empty() {
            tracing::info!("Built empty index (no chunks)");
            return Ok(Self::empty());
        }

        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let total_batches = batches.len();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(i, texts)| async move {
                let vectors = embedder
                    .embed_batch(&texts)
                    .await
                    .map_err(|e| RagError::Embedding(format!("batch {}: {:#}", i, e)))?;

                if vectors.len() != texts.len() {
                    return Err(RagError::Embedding(format!(
                        "batch {}: expected {} vectors, got {}",
                        i,
                        texts.len(),
                        vectors.len()
                    )));
                }

                tracing::debug!("Embedded batch {}/{}", i + 1, total_batches);
                Ok(vectors)
            })
            .buffered(concurrency.max(1))
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        let dimension = validate_dimensions(vectors.iter().map(Vec::as_slice))?;

        if let Some(declared) = embedder.dimension() {
            if declared != dimension {
                return Err(RagError::Embedding(format!(
                    "{} declares dimension {}, returned {}",
                    embedder.name(),
                    declared,
                    dimension
                )));
            }
        }

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord { chunk, vector })
            .collect();

        tracing::info!(
            "Built index: {} records, dimension {} ({} batches via {})",
            records.len(),
            dimension,
            total_batches,
            embedder.name()
        );

        Ok(Self { records, dimension })
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 벡터 차원 (빈 인덱스는 0)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&EmbeddingRecord> {
        self.records.get(index)
    }

    /// top-k 내적 유사도 검색
    ///
    /// `min(k, N)`개 결과를 스코어 내림차순으로 반환합니다.
    /// 동점은 삽입 순서 오름차순입니다.
    pub fn query(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievalResult<'_>>> {
        if k == 0 {
            return Err(RagError::invalid("k must be positive"));
        }
        if self.records.is_empty() {
            return Ok(vec![]);
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::invalid(format!(
                "query vector has dimension {}, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let scored = self.records.iter().enumerate().map(|(index, record)| Scored {
            score: dot_product(query_vector, &record.vector),
            index,
        });

        let ranked = if k >= self.records.len() {
            let mut all: Vec<Scored> = scored.collect();
            all.sort_by(|a, b| b.cmp(a));
            all
        } else {
            top_k(scored, k)
        };

        Ok(ranked
            .into_iter()
            .map(|s| RetrievalResult {
                score: s.score,
                index: s.index,
                record: &self.records[s.index],
            })
            .collect())
    }
}

// ============================================================================
// SharedIndex
// ============================================================================

/// 검색 서빙용 인덱스 핸들
///
/// 읽기 측은 `current()`로 스냅샷을 얻고, 재빌드된 인덱스는
/// `replace()`로 통째로 교체됩니다. 부분 빌드 상태는 노출되지 않습니다.
#[derive(Debug, Default)]
pub struct SharedIndex {
    inner: RwLock<Arc<EmbeddingIndex>>,
}

impl SharedIndex {
    pub fn new(index: EmbeddingIndex) -> Self {
        Self {
            inner: RwLock::new(Arc::new(index)),
        }
    }

    /// 현재 인덱스 스냅샷
    pub fn current(&self) -> Arc<EmbeddingIndex> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 새 인덱스로 교체하고 이전 인덱스 반환
    pub fn replace(&self, index: EmbeddingIndex) -> Arc<EmbeddingIndex> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

// ============================================================================
// Ranking
// ============================================================================

/// (스코어, 위치) 순위 키. 큰 쪽이 더 좋은 결과입니다.
#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f32,
    index: usize,
}

impl Scored {
    /// NaN은 최하위, -0.0은 0.0과 동일하게 취급
    fn rank_key(&self) -> f32 {
        if self.score.is_nan() {
            f32::NEG_INFINITY
        } else if self.score == 0.0 {
            0.0
        } else {
            self.score
        }
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key()
            .total_cmp(&other.rank_key())
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// 크기 k의 최소 힙으로 상위 k개 선택 (O(N log k))
fn top_k(items: impl Iterator<Item = Scored>, k: usize) -> Vec<Scored> {
    let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(k + 1);

    for item in items {
        if heap.len() < k {
            heap.push(Reverse(item));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if item > *worst {
                heap.pop();
                heap.push(Reverse(item));
            }
        }
    }

    // Reverse 오름차순 = 스코어 내림차순
    heap.into_sorted_vec().into_iter().map(|Reverse(s)| s).collect()
}

/// 내적
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// 모든 벡터의 차원이 같고 0이 아닌지 검증하고 차원 반환
fn validate_dimensions<'a>(vectors: impl Iterator<Item = &'a [f32]>) -> Result<usize> {
    let mut dimension: Option<usize> = None;

    for (i, vector) in vectors.enumerate() {
        if vector.is_empty() {
            return Err(RagError::Embedding(format!("vector {} is empty", i)));
        }
        match dimension {
            None => dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(RagError::Embedding(format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    d
                )));
            }
            Some(_) => {}
        }
    }

    Ok(dimension.unwrap_or(0))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use crate::embedding::HashingEmbedding;

    fn chunk(text: &str) -> Chunk {
        Chunk::from_text(1, text.to_string())
    }

    fn record(text: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk: chunk(text),
            vector,
        }
    }

    fn index_of(vectors: Vec<Vec<f32>>) -> EmbeddingIndex {
        let records = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| record(&format!("chunk {}", i), v))
            .collect();
        EmbeddingIndex::from_records(records).unwrap()
    }

    /// 배치마다 고정 개수만 반환하는 고장난 프로바이더
    struct ShortBatchEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortBatchEmbedder {
        async fn embed(&self, _text: &str) -> AnyResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, _texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]])
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    /// 호출마다 차원이 바뀌는 프로바이더
    struct DriftingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for DriftingEmbedder {
        async fn embed(&self, _text: &str) -> AnyResult<Vec<f32>> {
            let n = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(vec![0.5; 2 + n])
        }

        fn dimension(&self) -> Option<usize> {
            None
        }

        fn name(&self) -> &str {
            "drifting"
        }
    }

    /// 첫 배치만 느리게 끝나는 프로바이더 (텍스트 숫자를 벡터로 반환)
    struct SlowFirstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowFirstEmbedder {
        async fn embed(&self, text: &str) -> AnyResult<Vec<f32>> {
            let value: f32 = text.parse()?;
            let delay = if value == 0.0 { 80 } else { 5 };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(vec![value])
        }

        fn dimension(&self) -> Option<usize> {
            None
        }

        fn name(&self) -> &str {
            "slow-first"
        }
    }

    /// 선언한 차원과 다른 벡터를 반환하는 프로바이더
    struct MislabeledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MislabeledEmbedder {
        async fn embed(&self, _text: &str) -> AnyResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> Option<usize> {
            Some(3)
        }

        fn name(&self) -> &str {
            "mislabeled"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> AnyResult<Vec<f32>> {
            anyhow::bail!("model offline")
        }

        fn dimension(&self) -> Option<usize> {
            None
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_query_empty_index() {
        let index = EmbeddingIndex::empty();
        assert!(index.query(&[1.0, 2.0], 3).unwrap().is_empty());
        assert!(index.query(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn test_query_zero_k_rejected() {
        let index = index_of(vec![vec![1.0]]);
        assert!(matches!(index.query(&[1.0], 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(
            EmbeddingIndex::empty().query(&[1.0], 0),
            Err(RagError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = index_of(vec![vec![1.0, 0.0]]);
        assert!(matches!(index.query(&[1.0], 1), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn test_query_all_sorted_768() {
        let dim = 768;
        let vectors: Vec<Vec<f32>> = [0.1f32, 0.5, 0.3, 0.9, 0.2]
            .iter()
            .map(|s| vec![*s; dim])
            .collect();
        let index = index_of(vectors);
        let query = vec![1.0f32; dim];

        let results = index.query(&query, 5).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![3, 1, 2, 4, 0]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_query_k_larger_than_index() {
        let index = index_of(vec![vec![1.0], vec![2.0]]);
        assert_eq!(index.query(&[1.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_query_ties_keep_insertion_order() {
        let index = index_of(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![1.0, 0.0],
        ]);

        // 힙 경로 (k < N)
        let results = index.query(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![3, 0, 2]);

        // 전체 정렬 경로 (k >= N)
        let results = index.query(&[1.0, 0.0], 5).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![3, 0, 2, 4, 1]);
    }

    #[test]
    fn test_heap_matches_full_sort() {
        let vectors: Vec<Vec<f32>> = (0..200)
            .map(|i| vec![((i * 37) % 11) as f32, ((i * 13) % 7) as f32])
            .collect();
        let index = index_of(vectors);
        let query = [0.7f32, -0.3];

        let full: Vec<usize> = index.query(&query, 200).unwrap().iter().map(|r| r.index).collect();
        for k in [1, 5, 17, 199] {
            let partial: Vec<usize> = index.query(&query, k).unwrap().iter().map(|r| r.index).collect();
            assert_eq!(partial, full[..k].to_vec(), "k={}", k);
        }
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let index = index_of(vec![vec![f32::NAN], vec![1.0], vec![-1.0]]);
        let results = index.query(&[1.0], 3).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_from_records_rejects_mixed_dimensions() {
        let result = EmbeddingIndex::from_records(vec![
            record("a", vec![1.0, 2.0]),
            record("b", vec![1.0]),
        ]);
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_build_preserves_order_across_batches() {
        let embedder = HashingEmbedding::new(32).unwrap();
        let chunks: Vec<Chunk> = (0..10).map(|i| chunk(&format!("text number {}", i))).collect();

        let sequential = EmbeddingIndex::build(chunks.clone(), &embedder, 3).await.unwrap();
        let concurrent = EmbeddingIndex::build_concurrent(chunks.clone(), &embedder, 4, 3)
            .await
            .unwrap();
        let single = EmbeddingIndex::build(chunks.clone(), &embedder, 100).await.unwrap();

        assert_eq!(sequential.len(), 10);
        assert_eq!(sequential.dimension(), 32);
        assert_eq!(sequential, concurrent);
        assert_eq!(sequential, single);
        for (record, chunk) in sequential.records().iter().zip(&chunks) {
            assert_eq!(&record.chunk, chunk);
        }
    }

    #[tokio::test]
    async fn test_build_keeps_order_when_batches_finish_out_of_order() {
        let chunks: Vec<Chunk> = (0..6).map(|i| chunk(&i.to_string())).collect();

        let index = EmbeddingIndex::build_concurrent(chunks, &SlowFirstEmbedder, 1, 4)
            .await
            .unwrap();

        let values: Vec<f32> = index.records().iter().map(|r| r.vector[0]).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        for (i, record) in index.records().iter().enumerate() {
            assert_eq!(record.chunk.text, i.to_string());
        }
    }

    #[tokio::test]
    async fn test_build_rejects_undeclared_dimension() {
        let chunks = vec![chunk("a"), chunk("b")];
        let result = EmbeddingIndex::build(chunks, &MislabeledEmbedder, 2).await;
        match result {
            Err(RagError::Embedding(msg)) => assert!(msg.contains("declares dimension 3")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_empty_chunks() {
        let embedder = HashingEmbedding::new(8).unwrap();
        let index = EmbeddingIndex::build(vec![], &embedder, 4).await.unwrap();
        assert!(index.is_empty());
        assert!(index.query(&[0.0; 8], 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_zero_batch_size() {
        let embedder = HashingEmbedding::new(8).unwrap();
        let result = EmbeddingIndex::build(vec![chunk("a")], &embedder, 0).await;
        assert!(matches!(result, Err(RagError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_build_count_mismatch() {
        let chunks = vec![chunk("a"), chunk("b"), chunk("c")];
        let result = EmbeddingIndex::build(chunks, &ShortBatchEmbedder, 2).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_build_inconsistent_dimension() {
        let embedder = DriftingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let result = EmbeddingIndex::build(vec![chunk("a"), chunk("b")], &embedder, 2).await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_build_failure_aborts() {
        let result = EmbeddingIndex::build(vec![chunk("a")], &FailingEmbedder, 1).await;
        match result {
            Err(RagError::Embedding(msg)) => assert!(msg.contains("model offline")),
            other => panic!("unexpected: {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_shared_index_replace() {
        let shared = SharedIndex::new(EmbeddingIndex::empty());
        let before = shared.current();
        assert!(before.is_empty());

        let old = shared.replace(index_of(vec![vec![1.0]]));
        assert!(old.is_empty());
        assert_eq!(shared.current().len(), 1);
        // 이전 스냅샷은 그대로 유지
        assert!(before.is_empty());
    }

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }
}
