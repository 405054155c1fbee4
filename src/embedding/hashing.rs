//! 해싱 임베딩
//!
//! 모델 서버 없이 동작하는 결정적 임베딩입니다.
//! 소문자 단어를 FNV-1a 해시로 차원에 배치하고 L2 정규화합니다.
//! 의미 유사도는 약하지만 어휘가 겹치는 텍스트끼리는 내적이 커집니다.

use anyhow::Result;
use async_trait::async_trait;

use super::EmbeddingProvider;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 결정적 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        anyhow::ensure!(dimension > 0, "hashing dimension must be positive");
        Ok(Self { dimension })
    }

    /// 텍스트 → 정규화된 벡터 (동기)
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let slot = (hash % self.dimension as u64) as usize;
            // 상위 비트로 부호 결정 (충돌 상쇄)
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
