//! 답변 생성 모듈
//!
//! 검색된 컨텍스트와 질의로 자연어 답변을 만듭니다.
//!
//! 호출마다 다음 세 갈래 중 하나로 끝납니다.
//! 1. 컨텍스트가 비어 있으면 고정 안내 문구 (모델 호출 없음)
//! 2. 생성 백엔드가 설정되어 있으면 LLM 답변
//! 3. 백엔드가 없거나 실패/타임아웃이면 컨텍스트 첫 문단 (추출식 답변)
//!
//! 백엔드 에러는 호출자에게 전파하지 않습니다. 문서가 있는 한 항상 답변이 나갑니다.

mod gemini;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::{GeminiGenerator, DEFAULT_GENERATION_MODEL};

/// 컨텍스트가 비었을 때의 답변
pub const NO_RELEVANT_DOCUMENTS: &str =
    "No relevant documents found. Please upload documents first.";

/// 추출할 문단이 없을 때의 답변
pub const UNABLE_TO_ANSWER: &str = "Unable to generate answer.";

/// 기본 생성 타임아웃
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// GenerativeBackend Trait
// ============================================================================

/// 생성 모델 백엔드 트레이트
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

/// 생성 백엔드 유무 (생성 시점에 한 번 결정)
#[derive(Clone)]
pub enum Generator {
    /// 설정된 백엔드
    Configured(Arc<dyn GenerativeBackend>),
    /// 백엔드 없음 (추출식 답변만 사용)
    Absent,
}

impl Generator {
    /// 백엔드 설정 여부
    pub fn is_configured(&self) -> bool {
        matches!(self, Generator::Configured(_))
    }

    /// 표시용 이름
    pub fn describe(&self) -> &str {
        match self {
            Generator::Configured(backend) => backend.name(),
            Generator::Absent => "extractive",
        }
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Generator::Configured(backend) => {
                f.debug_tuple("Configured").field(&backend.name()).finish()
            }
            Generator::Absent => f.write_str("Absent"),
        }
    }
}

// ============================================================================
// AnswerSynthesizer
// ============================================================================

/// 답변 생성기
#[derive(Debug, Clone)]
pub struct AnswerSynthesizer {
    generator: Generator,
    timeout: Duration,
}

impl AnswerSynthesizer {
    /// 생성기와 타임아웃으로 생성
    pub fn new(generator: Generator, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// 추출식 답변만 쓰는 생성기
    pub fn extractive() -> Self {
        Self::new(Generator::Absent, DEFAULT_GENERATION_TIMEOUT)
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// 질의와 컨텍스트로 답변 생성 (실패하지 않음)
    pub async fn synthesize(&self, query: &str, context: &str) -> String {
        if context.trim().is_empty() {
            return NO_RELEVANT_DOCUMENTS.to_string();
        }

        let backend = match &self.generator {
            Generator::Configured(backend) => backend,
            Generator::Absent => return extractive_answer(context),
        };

        let prompt = build_prompt(query, context);

        match tokio::time::timeout(self.timeout, backend.generate(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => {
                tracing::warn!(
                    "{} returned an empty answer, using extractive fallback",
                    backend.name()
                );
                extractive_answer(context)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "{} generation failed, using extractive fallback: {:#}",
                    backend.name(),
                    e
                );
                extractive_answer(context)
            }
            Err(_) => {
                tracing::warn!(
                    "{} generation timed out after {:?}, using extractive fallback",
                    backend.name(),
                    self.timeout
                );
                extractive_answer(context)
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 생성 프롬프트 구성
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions using only the provided context.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Answer clearly and concisely based on the context above. \
         If the answer is not in the context, say so."
    )
}

/// 추출식 답변: 컨텍스트의 첫 번째 비어 있지 않은 문단
pub fn extractive_answer(context: &str) -> String {
    context
        .split("\n\n")
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNABLE_TO_ANSWER.to_string())
}

// ============================================================================
// Tests
// ============================================================================
