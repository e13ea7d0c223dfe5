//! Knowledge 모듈 - 문서 질의응답 지식 저장소
//!
//! - Chunker: 고정 크기 슬라이딩 윈도우 분할
//! - VectorIndex: 벡터 인덱스 인터페이스
//! - LanceDB: 영속 벡터 인덱스 (코사인 거리)
//! - Pipeline: 수집/질의 오케스트레이션

mod chunker;
mod lance;
mod pipeline;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, sliding_window_chunker, split_text, ChunkConfig, Chunker,
    SlidingWindowChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use lance::LanceVectorIndex;
pub use pipeline::{
    IngestFailure, IngestReport, QueryResult, RagPipeline, RetrievedChunk, DEFAULT_TOP_K,
};
pub use vector::{cosine_similarity, distance_to_score, IndexEntry, SearchHit, VectorIndex};
