//! 테스트 전용 헬퍼
//!
//! 모델 다운로드 없이 파이프라인을 돌리기 위한 결정적 임베딩과
//! 생성 백엔드 대역입니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::generation::GenerativeBackend;

/// 단어 해시 기반 결정적 임베딩 (bag-of-words, L2 정규화)
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

/// 프롬프트를 그대로 돌려주는 백엔드 (호출 횟수 기록)
#[derive(Debug, Default)]
pub struct EchoBackend {
    calls: Arc<AtomicUsize>,
}

impl EchoBackend {
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl GenerativeBackend for EchoBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("generated: {}", prompt))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// 항상 실패하는 백엔드 (쿼터 초과 등)
#[derive(Debug)]
pub struct FailingBackend;

#[async_trait]
impl GenerativeBackend for FailingBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("quota exceeded (429)")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 주어진 시간만큼 지연되는 백엔드
#[derive(Debug)]
pub struct SlowBackend(pub Duration);

#[async_trait]
impl GenerativeBackend for SlowBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedding_is_deterministic() {
        let embedder = HashEmbedding::new(32);
        let texts = vec!["Hello world".to_string(), "".to_string()];

        let batch = embedder.encode(&texts).await.unwrap();
        let single = embedder.encode_one("Hello world").await.unwrap();

        assert_eq!(batch[0], single);
        assert_eq!(batch[1].len(), 32);
        assert_eq!(batch[1][0], 1.0);
    }
}
