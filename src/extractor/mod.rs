//! 문서 로더 모듈
//!
//! 지원하는 파일 형식을 하나의 텍스트로 정규화합니다.
//! - 텍스트 파일: 직접 읽기
//! - PDF 파일: pdf-extract로 페이지별 추출 후 줄바꿈으로 연결

pub mod pdf;

use std::path::Path;

use anyhow::Context;

use crate::error::{RagError, RagResult};

// ============================================================================
// Document Format
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// 일반 텍스트 (txt, md)
    PlainText,
    /// PDF 파일
    Pdf,
}

impl DocumentFormat {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => Some(DocumentFormat::PlainText),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> RagResult<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| RagError::UnsupportedFormat(path.to_path_buf()))
    }
}

// ============================================================================
// Document Loader
// ============================================================================

/// 문서 로더
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// 형식을 지정하여 파일을 텍스트로 로드
    pub async fn load(&self, path: &Path, format: DocumentFormat) -> RagResult<String> {
        match format {
            DocumentFormat::PlainText => self.load_text(path).await,
            DocumentFormat::Pdf => self.load_pdf(path).await,
        }
    }

    /// 확장자로 형식을 판별한 뒤 로드
    pub async fn load_path(&self, path: &Path) -> RagResult<String> {
        let format = DocumentFormat::from_path(path)?;
        self.load(path, format).await
    }

    async fn load_text(&self, path: &Path) -> RagResult<String> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;
        Ok(text)
    }

    async fn load_pdf(&self, path: &Path) -> RagResult<String> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf::extract_text(&path))
            .await
            .context("PDF extraction task failed")??;
        Ok(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
