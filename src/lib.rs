//! docqa-rag - 로컬 문서 질의응답 RAG 시스템
//!
//! 문서를 청크로 나눠 로컬 임베딩 모델로 벡터화하고 LanceDB에 저장한 뒤,
//! 질문과 가장 가까운 청크를 찾아 답변을 생성합니다.
//! 생성 모델(Gemini)이 없거나 실패하면 검색된 문단을 그대로 답변으로 돌려줍니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{get_data_dir, RagConfig};
pub use embedding::{DeferredEmbedding, EmbeddingProvider, LocalEmbedding};
pub use error::{RagError, RagResult};
pub use extractor::{DocumentFormat, DocumentLoader};
pub use generation::{AnswerSynthesizer, GeminiGenerator, GenerativeBackend, Generator};
pub use knowledge::{
    ChunkConfig, Chunker, IndexEntry, IngestReport, LanceVectorIndex, QueryResult, RagPipeline,
    RetrievedChunk, SearchHit, SlidingWindowChunker, VectorIndex,
};
