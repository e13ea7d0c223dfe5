//! RAG 파이프라인 - 수집(ingest)과 질의(query) 오케스트레이션
//!
//! 수집: 로드 → 청킹 → (전체 배치) 임베딩 → source 단위 교체 upsert
//! 질의: 질의 임베딩 → top-k 검색 → 컨텍스트 조립 → 답변 생성
//!
//! 같은 문서를 다시 수집하면 해당 source의 기존 청크를 모두 지우고 새 청크로 교체합니다.
//! 이전 버전이 더 길었더라도 남는 청크가 없습니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::config::RagConfig;
use crate::embedding::{DeferredEmbedding, EmbeddingProvider, LocalEmbedding};
use crate::error::{RagError, RagResult};
use crate::extractor::{DocumentFormat, DocumentLoader};
use crate::generation::{AnswerSynthesizer, GeminiGenerator, Generator};

use super::chunker::{sliding_window_chunker, Chunker};
use super::lance::LanceVectorIndex;
use super::vector::{IndexEntry, VectorIndex};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 5;

/// 컨텍스트 청크 구분자
const CONTEXT_SEPARATOR: &str = "\n\n";

// ============================================================================
// Types
// ============================================================================

/// 검색된 청크
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// 청크 텍스트
    pub content: String,
    /// 문서 식별자
    pub source: String,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub score: f32,
}

/// 질의 결과
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// 답변
    pub answer: String,
    /// 참조한 문서 (처음 등장한 순서, 중복 없음)
    pub sources: Vec<String>,
    /// 유사도 순 검색 청크
    pub relevant_docs: Vec<RetrievedChunk>,
}

/// 수집 실패 파일
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// 수집 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// 처리된 문서 식별자 (basename)
    pub processed: Vec<String>,
    /// 실패한 파일
    pub failed: Vec<IngestFailure>,
    /// 저장된 청크 수
    pub chunks: usize,
}

impl IngestReport {
    /// 처리된 파일 수
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }
}

/// 한 파일에서 나온 청크 묶음
struct LoadedDocument {
    source: String,
    chunks: Vec<String>,
}

// ============================================================================
// RagPipeline
// ============================================================================

/// RAG 파이프라인
///
/// 프로세스 전체에서 하나의 인스턴스를 `Arc`로 공유합니다.
/// 인덱스 동기화는 [`VectorIndex`] 구현이 담당하며,
/// 답변 생성 호출 동안에는 어떤 인덱스 락도 잡지 않습니다.
pub struct RagPipeline {
    loader: DocumentLoader,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    synthesizer: AnswerSynthesizer,
}

impl RagPipeline {
    /// 구성 요소를 주입하여 생성
    pub fn new(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            loader: DocumentLoader::new(),
            chunker,
            embedder,
            index,
            synthesizer,
        }
    }

    /// 설정으로 생성
    ///
    /// 임베딩 모델 로드 실패는 여기서 바로 [`RagError::ModelUnavailable`]로 끝납니다.
    /// API 키가 없으면 추출식 답변 모드로 시작합니다.
    pub async fn from_config(config: &RagConfig) -> RagResult<Self> {
        // 모델 로드는 블로킹 (다운로드 포함 가능)
        let model = config.embedding_model.clone();
        let cache_dir = config.model_cache_dir();
        let embedder = tokio::task::spawn_blocking(move || LocalEmbedding::load(&model, &cache_dir))
            .await
            .context("Embedding model loader task failed")??;

        Self::assemble(config, Arc::new(embedder)).await
    }

    /// 설정으로 생성하되 임베딩 모델은 첫 인코딩 때 로드
    ///
    /// 목록 조회와 초기화는 모델 없이 끝납니다.
    /// 모델 식별자가 잘못되었으면 여기서 [`RagError::ModelUnavailable`]입니다.
    pub async fn from_config_deferred(config: &RagConfig) -> RagResult<Self> {
        let embedder =
            DeferredEmbedding::new(&config.embedding_model, &config.model_cache_dir())?;
        Self::assemble(config, Arc::new(embedder)).await
    }

    async fn assemble(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> RagResult<Self> {
        let chunker = sliding_window_chunker(config.chunk)?;

        let index = LanceVectorIndex::open(&config.index_path(), embedder.dimension())
            .await
            .context("Failed to open vector index")?;

        let generator = match &config.api_key {
            Some(key) => {
                let backend = GeminiGenerator::new(key.clone(), &config.generation_model)?;
                tracing::info!("Answer generation: {}", backend.model());
                Generator::Configured(Arc::new(backend))
            }
            None => {
                tracing::info!("No generation API key configured, using extractive answers");
                Generator::Absent
            }
        };

        Ok(Self::new(
            chunker,
            embedder,
            Arc::new(index),
            AnswerSynthesizer::new(generator, config.generation_timeout),
        ))
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    /// 파일 목록 수집
    ///
    /// 파일 하나의 실패는 경고 로그와 함께 건너뛰고 나머지를 계속 처리합니다.
    /// 모든 파일의 청크를 모아 한 번에 임베딩하고 한 번에 저장합니다.
    /// 경로가 주어졌는데 하나도 성공하지 못하면 [`RagError::NoDocumentsIngested`]입니다.
    pub async fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> RagResult<IngestReport> {
        let mut report = IngestReport::default();
        // source -> 문서 (같은 basename은 나중 파일이 우선)
        let mut documents: Vec<LoadedDocument> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for path in paths {
            let path = path.as_ref();
            match self.load_document(path).await {
                Ok(document) => {
                    tracing::debug!(
                        "Loaded {} ({} chunks)",
                        document.source,
                        document.chunks.len()
                    );
                    match positions.get(&document.source) {
                        Some(&pos) => {
                            tracing::warn!(
                                "Duplicate document name {} in batch, keeping {:?}",
                                document.source,
                                path
                            );
                            documents[pos] = document;
                        }
                        None => {
                            positions.insert(document.source.clone(), documents.len());
                            documents.push(document);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    report.failed.push(IngestFailure {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            if !paths.is_empty() {
                return Err(RagError::NoDocumentsIngested {
                    failed: report.failed.len(),
                });
            }
            return Ok(report);
        }

        // (chunk, id, source) 평탄화
        let mut texts = Vec::new();
        let mut keys = Vec::new();
        for document in &documents {
            for (i, chunk) in document.chunks.iter().enumerate() {
                texts.push(chunk.clone());
                keys.push((IndexEntry::chunk_id(&document.source, i), document.source.clone(), i));
            }
        }

        let embeddings = self
            .embedder
            .encode(&texts)
            .await
            .context("Failed to embed chunks")?;

        if embeddings.len() != texts.len() {
            return Err(RagError::Internal(anyhow::anyhow!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let entries: Vec<IndexEntry> = texts
            .into_iter()
            .zip(keys)
            .zip(embeddings)
            .map(|((text, (id, source, chunk_index)), embedding)| IndexEntry {
                id,
                source,
                chunk_index: chunk_index as i32,
                text,
                embedding,
            })
            .collect();

        let sources: Vec<String> = documents.iter().map(|d| d.source.clone()).collect();
        self.index
            .replace_sources(&sources, &entries)
            .await
            .context("Failed to store chunks")?;

        report.chunks = entries.len();
        report.processed = sources;

        tracing::info!(
            "Ingested {} document(s), {} chunk(s), {} failure(s)",
            report.processed.len(),
            report.chunks,
            report.failed.len()
        );

        Ok(report)
    }

    /// 파일 하나를 로드하고 청킹
    async fn load_document(&self, path: &Path) -> RagResult<LoadedDocument> {
        let format = DocumentFormat::from_path(path)?;
        let source = document_name(path)?;
        let text = self.loader.load(path, format).await?;
        let chunks = self.chunker.chunk(&text);

        if chunks.is_empty() {
            tracing::warn!("No text found in {:?}", path);
        }

        Ok(LoadedDocument { source, chunks })
    }

    /// 질의 응답
    pub async fn query(&self, text: &str, top_k: usize) -> RagResult<QueryResult> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if top_k == 0 {
            return Err(RagError::InvalidTopK(top_k));
        }

        let query_embedding = self
            .embedder
            .encode_one(text)
            .await
            .context("Failed to embed query")?;

        let hits = self
            .index
            .search(&query_embedding, top_k)
            .await
            .context("Vector search failed")?;

        let mut sources: Vec<String> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.source) {
                sources.push(hit.source.clone());
            }
        }

        let relevant_docs: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                content: hit.text,
                source: hit.source,
                score: hit.score,
            })
            .collect();

        let context = relevant_docs
            .iter()
            .map(|doc| doc.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let answer = self.synthesizer.synthesize(text, &context).await;

        Ok(QueryResult {
            answer,
            sources,
            relevant_docs,
        })
    }

    /// 저장된 문서 목록 (중복 없음)
    pub async fn list_documents(&self) -> RagResult<Vec<String>> {
        Ok(self
            .index
            .list_sources()
            .await
            .context("Failed to list documents")?)
    }

    /// 모든 문서 삭제 (빈 인덱스에서도 안전)
    pub async fn clear_documents(&self) -> RagResult<()> {
        self.index
            .reset()
            .await
            .context("Failed to clear documents")?;
        tracing::info!("Cleared all documents");
        Ok(())
    }

    /// 저장된 청크 수
    pub async fn chunk_count(&self) -> RagResult<usize> {
        Ok(self.index.count().await.context("Failed to count chunks")?)
    }
}

/// 문서 식별자 = 파일 basename
fn document_name(path: &Path) -> RagResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::Internal(anyhow::anyhow!("Invalid file name: {:?}", path)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::generation::NO_RELEVANT_DOCUMENTS;
    use crate::knowledge::{default_chunker, ChunkConfig};
    use crate::testing::{EchoBackend, HashEmbedding, SlowBackend};

    const DIM: usize = 64;

    async fn pipeline_with(temp_dir: &TempDir, synthesizer: AnswerSynthesizer) -> RagPipeline {
        let index = LanceVectorIndex::open(&temp_dir.path().join("vectors.lance"), DIM)
            .await
            .unwrap();
        RagPipeline::new(
            default_chunker(),
            Arc::new(HashEmbedding::new(DIM)),
            Arc::new(index),
            synthesizer,
        )
    }

    async fn extractive_pipeline(temp_dir: &TempDir) -> RagPipeline {
        pipeline_with(temp_dir, AnswerSynthesizer::extractive()).await
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_single_sentence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;
        let file = write_file(&temp_dir, "france.txt", "The capital of France is Paris.");

        let report = pipeline.ingest(&[&file]).await.unwrap();
        assert_eq!(report.processed, vec!["france.txt".to_string()]);
        assert_eq!(report.chunks, 1);

        let result = pipeline
            .query("What is the capital of France?", 1)
            .await
            .unwrap();
        assert_eq!(result.answer, "The capital of France is Paris.");
        assert_eq!(result.sources, vec!["france.txt".to_string()]);
        assert_eq!(result.relevant_docs.len(), 1);
        assert_eq!(result.relevant_docs[0].source, "france.txt");
    }

    #[tokio::test]
    async fn test_list_documents_once_per_file() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        // 기본 설정으로 10개가 넘는 청크
        let long = "Rust ownership rules keep memory safe. ".repeat(300);
        let a = write_file(&temp_dir, "rust.txt", &long);
        let b = write_file(&temp_dir, "notes.md", "Short note.");

        let report = pipeline.ingest(&[a, b]).await.unwrap();
        assert!(report.chunks > 11);

        assert_eq!(
            pipeline.list_documents().await.unwrap(),
            vec!["notes.md".to_string(), "rust.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        let result = pipeline.query("anything at all?", 5).await.unwrap();
        assert_eq!(result.answer, NO_RELEVANT_DOCUMENTS);
        assert!(result.sources.is_empty());
        assert!(result.relevant_docs.is_empty());
    }

    #[tokio::test]
    async fn test_backend_timeout_still_answers() {
        let temp_dir = TempDir::new().unwrap();
        let synthesizer = AnswerSynthesizer::new(
            Generator::Configured(Arc::new(SlowBackend(Duration::from_secs(10)))),
            Duration::from_millis(50),
        );
        let pipeline = pipeline_with(&temp_dir, synthesizer).await;
        let file = write_file(&temp_dir, "france.txt", "The capital of France is Paris.");
        pipeline.ingest(&[file]).await.unwrap();

        let result = pipeline.query("capital of France", 3).await.unwrap();
        assert_eq!(result.answer, "The capital of France is Paris.");
    }

    #[tokio::test]
    async fn test_configured_backend_receives_context() {
        let temp_dir = TempDir::new().unwrap();
        let echo = EchoBackend::default();
        let calls = echo.calls();
        let synthesizer = AnswerSynthesizer::new(
            Generator::Configured(Arc::new(echo)),
            Duration::from_secs(5),
        );
        let pipeline = pipeline_with(&temp_dir, synthesizer).await;
        let file = write_file(&temp_dir, "france.txt", "The capital of France is Paris.");
        pipeline.ingest(&[file]).await.unwrap();

        let result = pipeline.query("capital of France", 1).await.unwrap();
        assert!(result.answer.contains("The capital of France is Paris."));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_file_does_not_abort_batch() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        let good = write_file(&temp_dir, "good.txt", "Useful content.");
        let unsupported = write_file(&temp_dir, "slides.pptx", "binary");
        let missing = temp_dir.path().join("missing.txt");

        let report = pipeline
            .ingest(&[unsupported, good, missing])
            .await
            .unwrap();
        assert_eq!(report.processed_count(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(pipeline.list_documents().await.unwrap(), vec!["good.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_all_files_failing_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        let err = pipeline
            .ingest(&[temp_dir.path().join("nope.docx")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocumentsIngested { failed: 1 }));

        let empty: [PathBuf; 0] = [];
        let report = pipeline.ingest(&empty).await.unwrap();
        assert_eq!(report.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("vectors.lance"), DIM)
            .await
            .unwrap();
        let chunker = sliding_window_chunker(ChunkConfig::new(20, 5).unwrap()).unwrap();
        let pipeline = RagPipeline::new(
            chunker,
            Arc::new(HashEmbedding::new(DIM)),
            Arc::new(index),
            AnswerSynthesizer::extractive(),
        );

        let file = write_file(&temp_dir, "doc.txt", &"long version text ".repeat(10));
        let first = pipeline.ingest(&[&file]).await.unwrap();
        assert!(first.chunks > 3);

        std::fs::write(&file, "short version").unwrap();
        let second = pipeline.ingest(&[&file]).await.unwrap();
        assert_eq!(second.chunks, 1);

        assert_eq!(pipeline.chunk_count().await.unwrap(), 1);
        let result = pipeline.query("version", 10).await.unwrap();
        assert_eq!(result.relevant_docs.len(), 1);
        assert_eq!(result.relevant_docs[0].content, "short version");
    }

    #[tokio::test]
    async fn test_sources_deduplicated_in_rank_order() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("vectors.lance"), DIM)
            .await
            .unwrap();
        let chunker = sliding_window_chunker(ChunkConfig::new(40, 0).unwrap()).unwrap();
        let pipeline = RagPipeline::new(
            chunker,
            Arc::new(HashEmbedding::new(DIM)),
            Arc::new(index),
            AnswerSynthesizer::extractive(),
        );

        let a = write_file(
            &temp_dir,
            "paris.txt",
            "Paris is the capital city of France. Paris has the Eiffel tower.",
        );
        let b = write_file(&temp_dir, "other.txt", "Bananas are yellow fruit.");
        pipeline.ingest(&[a, b]).await.unwrap();

        let result = pipeline.query("Paris capital France", 10).await.unwrap();
        assert_eq!(result.relevant_docs.len(), 3);
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0], result.relevant_docs[0].source);
        for pair in result.relevant_docs.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_deferred_pipeline_manages_index_without_model() {
        let temp_dir = TempDir::new().unwrap();
        let config = RagConfig::default().with_data_dir(temp_dir.path());

        let pipeline = RagPipeline::from_config_deferred(&config).await.unwrap();
        assert_eq!(pipeline.embedder().name(), config.embedding_model);
        assert!(!pipeline.synthesizer().generator().is_configured());

        assert!(pipeline.list_documents().await.unwrap().is_empty());
        pipeline.clear_documents().await.unwrap();
        assert_eq!(pipeline.chunk_count().await.unwrap(), 0);

        // 가중치 캐시를 건드리지 않음
        assert!(!config.model_cache_dir().exists());
    }

    #[tokio::test]
    async fn test_clear_documents() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        // 빈 인덱스에서도 성공
        pipeline.clear_documents().await.unwrap();

        let file = write_file(&temp_dir, "a.txt", "Some text.");
        pipeline.ingest(&[file]).await.unwrap();
        pipeline.clear_documents().await.unwrap();

        assert!(pipeline.list_documents().await.unwrap().is_empty());
        let result = pipeline.query("text", 5).await.unwrap();
        assert_eq!(result.answer, NO_RELEVANT_DOCUMENTS);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = extractive_pipeline(&temp_dir).await;

        let err = pipeline.query("   ", 5).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyQuery));
        assert!(err.is_user_error());

        let err = pipeline.query("valid", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidTopK(0)));
    }

    #[tokio::test]
    async fn test_concurrent_ingest_and_clear_leave_consistent_index() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = Arc::new(extractive_pipeline(&temp_dir).await);
        let file = write_file(&temp_dir, "doc.txt", &"alpha beta gamma ".repeat(200));

        let ingest = {
            let pipeline = Arc::clone(&pipeline);
            let file = file.clone();
            tokio::spawn(async move { pipeline.ingest(&[file]).await })
        };
        let clear = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.clear_documents().await })
        };

        let report = ingest.await.unwrap().unwrap();
        clear.await.unwrap().unwrap();

        // 전부 남았거나 전부 지워졌거나
        let count = pipeline.chunk_count().await.unwrap();
        assert!(count == 0 || count == report.chunks, "count={count}");
    }
}
