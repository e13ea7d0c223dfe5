//! CLI 모듈
//!
//! docqa CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectionStats, FileCollector};
use crate::config::RagConfig;
use crate::knowledge::{RagPipeline, DEFAULT_TOP_K};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "로컬 문서 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (DOCQA_DATA_DIR 대신 사용)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 지식베이스에 추가 (txt, md, pdf)
    Ingest {
        /// 수집할 파일 경로
        files: Vec<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// 질문하기
    Query {
        /// 질문
        query: String,

        /// 검색할 청크 개수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 저장된 문서 목록
    List,

    /// 모든 문서 삭제
    Clear,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;
    if let Some(ref data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    match cli.command {
        Commands::Ingest { files, dir } => cmd_ingest(&config, files, dir).await,
        Commands::Query { query, top_k, json } => cmd_query(&config, &query, top_k, json).await,
        Commands::List => cmd_list(&config).await,
        Commands::Clear => cmd_clear(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

async fn open_pipeline(config: &RagConfig) -> Result<RagPipeline> {
    RagPipeline::from_config(config)
        .await
        .context("파이프라인 초기화 실패")
}

/// 임베딩 모델 로드 없이 파이프라인 열기 (list, clear, status)
async fn open_deferred_pipeline(config: &RagConfig) -> Result<RagPipeline> {
    RagPipeline::from_config_deferred(config)
        .await
        .context("파이프라인 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &RagConfig,
    mut files: Vec<PathBuf>,
    dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(ref dir_path) = dir {
        let collected = FileCollector::with_defaults().collect_directory(dir_path)?;

        let stats = CollectionStats::from_files(&collected);
        println!("[*] 수집 대상: {} 파일", stats.total_files);
        println!("    텍스트: {}, PDF: {}", stats.text_files, stats.pdf_files);
        println!("    총 크기: {}", format_bytes(stats.total_size as usize));
        println!();

        files.extend(collected.into_iter().map(|f| f.path));
    }

    if files.is_empty() {
        bail!("수집할 파일이 없습니다. 파일 경로 또는 --dir를 지정하세요");
    }

    let pipeline = open_pipeline(config).await?;

    println!("[*] {} 파일 처리 중...", files.len());
    let report = pipeline
        .ingest(files.as_slice())
        .await
        .context("문서 수집 실패")?;

    for failure in &report.failed {
        println!("[!] 실패: {} ({})", failure.path.display(), failure.reason);
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 실패 {}, 청크 {}",
        report.processed_count(),
        report.failed.len(),
        report.chunks
    );

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(config: &RagConfig, query: &str, top_k: usize, json: bool) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let result = pipeline.query(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    println!();

    if result.relevant_docs.is_empty() {
        return Ok(());
    }

    println!("[*] 출처: {}", result.sources.join(", "));
    println!();

    for (i, doc) in result.relevant_docs.iter().enumerate() {
        println!("{}. [점수: {:.4}] {}", i + 1, doc.score, doc.source);
        println!("   내용: {}", truncate_text(&doc.content, 200));
        println!();
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(config: &RagConfig) -> Result<()> {
    let pipeline = open_deferred_pipeline(config).await?;
    let sources = pipeline
        .list_documents()
        .await
        .context("문서 목록 조회 실패")?;

    if sources.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", sources.len());
    for source in sources {
        println!("  {}", source);
    }

    Ok(())
}

/// 삭제 명령어 (clear)
async fn cmd_clear(config: &RagConfig) -> Result<()> {
    let pipeline = open_deferred_pipeline(config).await?;
    pipeline.clear_documents().await.context("문서 삭제 실패")?;

    println!("[OK] 모든 문서가 삭제되었습니다");
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("docqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 청크: {} 문자 / 오버랩 {}",
        config.chunk.chunk_size, config.chunk.overlap
    );

    let pipeline = match open_deferred_pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("[!] 파이프라인 초기화 실패: {:#}", e);
            return Ok(());
        }
    };

    let embedder = pipeline.embedder();
    println!(
        "[*] 임베딩 모델: {} (차원 {})",
        embedder.name(),
        embedder.dimension()
    );

    let generator = pipeline.synthesizer().generator();
    if generator.is_configured() {
        println!("[OK] 답변 생성: {}", generator.describe());
    } else {
        println!("[!] 답변 생성: API 키 미설정 (추출식 답변)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match (pipeline.list_documents().await, pipeline.chunk_count().await) {
        (Ok(sources), Ok(count)) => {
            println!("[OK] 저장된 문서: {} 건, 청크: {} 개", sources.len(), count);
        }
        (Err(e), _) | (_, Err(e)) => {
            println!("[!] 인덱스 조회 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from(["docqa", "query", "What is Rust?", "-k", "3", "--json"])
            .unwrap();
        match cli.command {
            Commands::Query { query, top_k, json } => {
                assert_eq!(query, "What is Rust?");
                assert_eq!(top_k, 3);
                assert!(json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_ingest_defaults() {
        let cli = Cli::try_parse_from(["docqa", "--data-dir", "/tmp/x", "ingest", "a.txt", "b.pdf"])
            .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Ingest { files, dir } => {
                assert_eq!(files.len(), 2);
                assert!(dir.is_none());
            }
            _ => panic!("expected ingest command"),
        }

        let cli = Cli::try_parse_from(["docqa", "query", "hi"]).unwrap();
        assert!(matches!(cli.command, Commands::Query { top_k: 5, .. }));
    }
}
