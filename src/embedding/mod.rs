//! 임베딩 모듈 - 로컬 사전학습 모델을 통한 텍스트 벡터화
//!
//! fastembed(ONNX Runtime)로 모델을 로컬에서 실행합니다.
//! 가중치는 최초 실행 시 내려받아 캐시 디렉토리에 저장되며,
//! 그 이후로는 네트워크 호출이 없습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = LocalEmbedding::load("all-minilm-l6-v2", &cache_dir)?;
//! let vector = embedder.encode_one("Hello, world!").await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use crate::error::{RagError, RagResult};

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// 한 번의 추론 호출에 넣는 최대 텍스트 수
const INFERENCE_BATCH_SIZE: usize = 64;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델 버전이면 같은 입력에 같은 벡터를 돌려줘야 합니다.
/// 배치 인코딩과 단건 인코딩의 결과는 부동소수점 오차 범위 내에서 일치해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지)
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 단일 텍스트 임베딩
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Model Registry
// ============================================================================

/// 지원 모델: (식별자, fastembed 모델, 차원)
fn resolve_model(name: &str) -> RagResult<(EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        other => Err(RagError::ModelUnavailable(format!(
            "unknown embedding model '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
            other
        ))),
    }
}

/// 모델 식별자의 임베딩 차원
pub fn model_dimension(name: &str) -> RagResult<usize> {
    resolve_model(name).map(|(_, dimension)| dimension)
}

// ============================================================================
// Local Embedding (fastembed)
// ============================================================================

/// 로컬 임베딩 구현체
///
/// 모델은 생성 시점에 한 번 로드됩니다. 로드에 실패하면 파이프라인을 만들 수 없습니다.
pub struct LocalEmbedding {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
    dimension: usize,
}

impl std::fmt::Debug for LocalEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedding")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalEmbedding {
    /// 모델 로드
    ///
    /// # Arguments
    /// * `name` - 모델 식별자 (예: `all-minilm-l6-v2`)
    /// * `cache_dir` - 가중치 캐시 디렉토리
    pub fn load(name: &str, cache_dir: &Path) -> RagResult<Self> {
        let (model, dimension) = resolve_model(name)?;

        let options = InitOptions::new(model)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            RagError::ModelUnavailable(format!("failed to load '{}': {}", name, e))
        })?;

        tracing::info!("Loaded embedding model {} (dimension: {})", name, dimension);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            name: name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        // 추론은 CPU 바운드이므로 spawn_blocking 사용
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let expected = texts.len();

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model = model
                .lock()
                .map_err(|e| anyhow::anyhow!("Embedding model lock poisoned: {}", e))?;
            model
                .embed(texts, Some(INFERENCE_BATCH_SIZE))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await
        .context("Embedding task failed")??;

        if vectors.len() != expected {
            anyhow::bail!(
                "Embedding count mismatch: expected {}, got {}",
                expected,
                vectors.len()
            );
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Deferred Embedding
// ============================================================================

/// 첫 인코딩 때 모델을 로드하는 임베딩
///
/// 모델 식별자와 차원은 생성 시점에 검증하지만 가중치는 건드리지 않습니다.
/// 목록 조회, 초기화처럼 인코딩이 필요 없는 작업에 사용합니다.
pub struct DeferredEmbedding {
    name: String,
    cache_dir: PathBuf,
    dimension: usize,
    model: OnceCell<LocalEmbedding>,
}

impl DeferredEmbedding {
    pub fn new(name: &str, cache_dir: &Path) -> RagResult<Self> {
        let dimension = model_dimension(name)?;
        Ok(Self {
            name: name.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            dimension,
            model: OnceCell::new(),
        })
    }

    /// 모델 로드 여부
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<&LocalEmbedding> {
        self.model
            .get_or_try_init(|| async {
                let name = self.name.clone();
                let cache_dir = self.cache_dir.clone();
                let model =
                    tokio::task::spawn_blocking(move || LocalEmbedding::load(&name, &cache_dir))
                        .await
                        .context("Embedding model loader task failed")??;
                Ok::<_, anyhow::Error>(model)
            })
            .await
    }
}

impl std::fmt::Debug for DeferredEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredEmbedding")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[async_trait]
impl EmbeddingProvider for DeferredEmbedding {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.model().await?.encode(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Tests
// ============================================================================
