//! 설정 모듈
//!
//! 환경변수(및 선택적인 `.env` 파일)에서 설정을 읽습니다.
//!
//! | 변수 | 기본값 |
//! |------|--------|
//! | `DOCQA_DATA_DIR` | `<local data dir>/.docqa-rag` |
//! | `DOCQA_EMBEDDING_MODEL` | `all-minilm-l6-v2` |
//! | `DOCQA_CHUNK_SIZE` | `1000` |
//! | `DOCQA_CHUNK_OVERLAP` | `200` |
//! | `DOCQA_GENERATION_MODEL` | `gemini-2.0-flash` |
//! | `DOCQA_GENERATION_TIMEOUT_SECS` | `30` |
//! | `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY` | 없음 (추출식 답변) |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::embedding::DEFAULT_MODEL;
use crate::error::{RagError, RagResult};
use crate::generation::{DEFAULT_GENERATION_MODEL, DEFAULT_GENERATION_TIMEOUT};
use crate::knowledge::ChunkConfig;

/// 데이터 디렉토리 경로 (~/.docqa-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

/// 파이프라인 설정
#[derive(Clone)]
pub struct RagConfig {
    /// 데이터 디렉토리 (인덱스 + 모델 캐시)
    pub data_dir: PathBuf,
    /// 임베딩 모델 식별자
    pub embedding_model: String,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 생성 모델 이름
    pub generation_model: String,
    /// 생성 호출 타임아웃
    pub generation_timeout: Duration,
    /// 생성 백엔드 API 키 (없으면 추출식 답변)
    pub api_key: Option<String>,
}

impl std::fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagConfig")
            .field("data_dir", &self.data_dir)
            .field("embedding_model", &self.embedding_model)
            .field("chunk", &self.chunk)
            .field("generation_model", &self.generation_model)
            .field("generation_timeout", &self.generation_timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            embedding_model: DEFAULT_MODEL.to_string(),
            chunk: ChunkConfig::default(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            api_key: None,
        }
    }
}

impl RagConfig {
    /// 프로세스 환경변수에서 로드
    pub fn from_env() -> RagResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 로드
    pub fn from_lookup<F>(lookup: F) -> RagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let chunk_size = parse_var(&get, "DOCQA_CHUNK_SIZE", defaults.chunk.chunk_size)?;
        let overlap = parse_var(&get, "DOCQA_CHUNK_OVERLAP", defaults.chunk.overlap)?;
        let timeout_secs = parse_var(
            &get,
            "DOCQA_GENERATION_TIMEOUT_SECS",
            defaults.generation_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(RagError::InvalidConfig(
                "DOCQA_GENERATION_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            data_dir: get("DOCQA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            embedding_model: get("DOCQA_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            chunk: ChunkConfig::new(chunk_size, overlap)?,
            generation_model: get("DOCQA_GENERATION_MODEL").unwrap_or(defaults.generation_model),
            generation_timeout: Duration::from_secs(timeout_secs),
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_AI_API_KEY")),
        })
    }

    /// 데이터 디렉토리 변경
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.data_dir = data_dir.to_path_buf();
        self
    }

    /// 벡터 인덱스 경로
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 임베딩 모델 캐시 경로
    pub fn model_cache_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> RagResult<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            RagError::InvalidConfig(format!(
                "{} must be a non-negative integer, got '{}'",
                key, raw
            ))
        }),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.embedding_model, "all-minilm-l6-v2");
        assert_eq!(config.chunk, ChunkConfig::default());
        assert_eq!(config.generation_timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
        assert!(config.index_path().ends_with("vectors.lance"));
    }

    #[test]
    fn test_overrides() {
        let config = RagConfig::from_lookup(lookup(&[
            ("DOCQA_DATA_DIR", "/tmp/docqa"),
            ("DOCQA_CHUNK_SIZE", "500"),
            ("DOCQA_CHUNK_OVERLAP", "50"),
            ("DOCQA_GENERATION_TIMEOUT_SECS", "5"),
            ("GOOGLE_AI_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/docqa"));
        assert_eq!(config.chunk.chunk_size, 500);
        assert_eq!(config.chunk.overlap, 50);
        assert_eq!(config.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_blank_api_key_means_absent() {
        let config = RagConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = RagConfig::from_lookup(lookup(&[("DOCQA_CHUNK_SIZE", "big")])).unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));

        let err = RagConfig::from_lookup(lookup(&[
            ("DOCQA_CHUNK_SIZE", "100"),
            ("DOCQA_CHUNK_OVERLAP", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));

        let err = RagConfig::from_lookup(lookup(&[("DOCQA_GENERATION_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }
}
