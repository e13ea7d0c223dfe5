//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스는 (id, 임베딩, 청크 텍스트, source) 튜플의 유일한 영속 저장소입니다.
//! 별도의 문서 테이블은 없습니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// 청크 ID (`{source}_{chunk_index}`)
    pub id: String,
    /// 문서 식별자 (파일 basename)
    pub source: String,
    /// 문서 내 청크 순번 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    /// 청크 ID 규칙
    pub fn chunk_id(source: &str, chunk_index: usize) -> String {
        format!("{}_{}", source, chunk_index)
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// 청크 ID
    pub id: String,
    /// 문서 식별자
    pub source: String,
    /// 청크 순번
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
    /// 코사인 거리 (0.0 ~ 2.0)
    pub distance: f32,
    /// 유사도 스코어 (0.0 ~ 1.0, 높을수록 관련성 높음)
    pub score: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 변경 연산(`upsert`, `replace_sources`, `reset`)은 서로 직렬화되어야 하며,
/// 읽기 연산은 변경 도중의 중간 상태를 관찰해서는 안 됩니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// id 기준 삽입 또는 교체
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// 주어진 source의 기존 엔트리를 모두 지우고 새 엔트리를 upsert (하나의 커밋)
    ///
    /// 실패하면 기존 엔트리가 그대로 남습니다.
    async fn replace_sources(&self, sources: &[String], entries: &[IndexEntry]) -> Result<usize>;

    /// k-최근접 이웃 검색 (스코어 내림차순)
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// 저장된 문서 식별자 목록 (중복 제거, 정렬)
    async fn list_sources(&self) -> Result<Vec<String>>;

    /// 저장된 청크 개수
    async fn count(&self) -> Result<usize>;

    /// 컬렉션 전체 초기화 (없으면 no-op)
    async fn reset(&self) -> Result<()>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 거리를 유사도 스코어로 변환
///
/// score = 1 - distance. 정규화되지 않은 벡터의 코사인 거리는 [0, 2] 범위이므로
/// 결과를 [0, 1]로 자릅니다.
pub fn distance_to_score(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
