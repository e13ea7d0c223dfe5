//! Text Chunking Module
//!
//! 고정 크기 슬라이딩 윈도우로 문서를 청크로 나눕니다.
//! 인접 청크는 `overlap` 문자만큼 겹치므로, 청크 경계를 넘는 답변 구간도
//! 어느 한 청크에는 온전히 포함될 가능성이 높아집니다.

use crate::error::{RagError, RagResult};

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// 기본 오버랩 크기 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수, chunk_size 미만)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (검증 포함)
    pub fn new(chunk_size: usize, overlap: usize) -> RagResult<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// 윈도우가 항상 전진하는지 확인
    pub fn validate(&self) -> RagResult<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// 윈도우 이동 간격
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할 (문서 순서 유지)
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SlidingWindowChunker
// ============================================================================

/// 문자 단위 슬라이딩 윈도우 청커
///
/// UTF-8 다중 바이트 문자를 자르지 않도록 바이트가 아닌 문자 수로 셉니다.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    config: ChunkConfig,
}

impl SlidingWindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> RagResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성 (1000 / 200)
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        // 각 문자의 시작 바이트 오프셋 + 끝 오프셋
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_count = offsets.len();
        offsets.push(text.len());

        let step = self.config.step();
        let mut chunks = Vec::with_capacity(char_count / step + 1);
        let mut start = 0;

        loop {
            let end = (start + self.config.chunk_size).min(char_count);
            chunks.push(text[offsets[start]..offsets[end]].to_string());

            if end >= char_count {
                break;
            }
            start += step;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "SlidingWindowChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SlidingWindowChunker::with_defaults())
}

/// 설정을 지정하여 청커 생성
pub fn sliding_window_chunker(config: ChunkConfig) -> RagResult<Box<dyn Chunker>> {
    Ok(Box::new(SlidingWindowChunker::new(config)?))
}

/// 문자열을 바로 분할 (`chunk_size`, `overlap` 지정)
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> RagResult<Vec<String>> {
    let chunker = SlidingWindowChunker::new(ChunkConfig::new(chunk_size, overlap)?)?;
    Ok(chunker.chunk(text))
}

// ============================================================================
// Tests
// ============================================================================
