//! 에러 타입
//!
//! 파이프라인 경계에서 호출자에게 노출되는 에러 분류입니다.
//! 컴포넌트 내부는 `anyhow::Result`를 사용하고, 예상하지 못한 에러는
//! [`RagError::Internal`]로 감싸져 전달됩니다.

use std::path::PathBuf;

use thiserror::Error;

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 임베딩 모델 로드 실패 (시작 시점, 치명적)
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// 잘못된 설정값 (청크 크기, 환경변수 등)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 지원하지 않는 파일 형식
    #[error("unsupported document format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// 빈 질의
    #[error("query must not be empty")]
    EmptyQuery,

    /// top_k 범위 오류
    #[error("top_k must be greater than zero (got {0})")]
    InvalidTopK(usize),

    /// 배치의 모든 파일이 실패
    #[error("no documents could be ingested ({failed} file(s) failed)")]
    NoDocumentsIngested { failed: usize },

    /// 저장소 I/O, 임베딩 실패 등 내부 에러
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    /// 사용자 입력 검증 에러 여부
    pub fn is_user_error(&self) -> bool {
        matches!(self, RagError::EmptyQuery | RagError::InvalidTopK(_))
    }
}

/// 파이프라인 결과 타입
pub type RagResult<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_distinct_from_internal() {
        assert!(RagError::EmptyQuery.is_user_error());
        assert!(RagError::InvalidTopK(0).is_user_error());

        let internal = RagError::from(anyhow::anyhow!("disk full"));
        assert!(!internal.is_user_error());
        assert_eq!(internal.to_string(), "disk full");
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = RagError::UnsupportedFormat(PathBuf::from("notes.docx"));
        assert_eq!(err.to_string(), "unsupported document format: notes.docx");
    }
}
