//! CLI 모듈
//!
//! helpdesk-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::answer::create_composer;
use crate::collector::{CollectionStats, CollectorConfig, FileCollector};
use crate::config::{get_data_dir, EngineConfig, ExclusionPolicy};
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::gemini::has_api_key;
use crate::knowledge::{Answer, ChunkMode, IngestStatus, RetrievalEngine, Verdict};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "helpdesk-rag")]
#[command(version, about = "1선 지원 엔지니어용 매뉴얼 검색 도우미", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령어 공통 옵션
#[derive(Args)]
pub struct GlobalArgs {
    /// 데이터 디렉토리 (기본: ~/.helpdesk-rag)
    #[arg(long, global = true, env = "HELPDESK_RAG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 청킹 방식 (config.toml 설정보다 우선)
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// 고정 크기 윈도우
    Flat,
    /// 장 제목 기준
    Chapter,
}

impl From<ModeArg> for ChunkMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Flat => ChunkMode::Flat,
            ModeArg::Chapter => ChunkMode::Chapter,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum VerdictArg {
    Correct,
    Incorrect,
}

impl From<VerdictArg> for Verdict {
    fn from(verdict: VerdictArg) -> Self {
        match verdict {
            VerdictArg::Correct => Verdict::Correct,
            VerdictArg::Incorrect => Verdict::Incorrect,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 매뉴얼 파일 또는 폴더 수집
    Ingest {
        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// PDF만 수집
        #[arg(long)]
        pdf_only: bool,

        /// 기존 인덱스를 치우고 새로 수집 (임베딩 모델을 바꾼 경우)
        #[arg(long)]
        reindex: bool,
    },

    /// 질문하기
    Ask {
        question: String,

        /// 답변 후 맞음/틀림 판정 입력
        #[arg(long)]
        review: bool,
    },

    /// 질문을 다시 실행하고 판정 기록
    Feedback {
        question: String,

        #[arg(value_enum)]
        verdict: VerdictArg,
    },

    /// 무관한 조각을 블랙리스트에 추가
    MarkBad { fragment: String },

    /// 수집된 문서 목록
    Documents,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let reindex = matches!(cli.command, Commands::Ingest { reindex: true, .. });
    let engine = open_engine(&cli.global, reindex)?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            pdf_only,
            ..
        } => cmd_ingest(&engine, file, dir, pdf_only).await,
        Commands::Ask { question, review } => cmd_ask(&engine, &question, review).await,
        Commands::Feedback { question, verdict } => {
            cmd_feedback(&engine, &question, verdict.into()).await
        }
        Commands::MarkBad { fragment } => cmd_mark_bad(&engine, &fragment).await,
        Commands::Documents => cmd_documents(&engine).await,
        Commands::Status => cmd_status(&engine).await,
    }
}

/// 설정 로드 → 임베더 선택 → 엔진 열기
///
/// `reindex`가 아니면 다른 임베딩 모델로 만든 인덱스를 건드리지 않고 실패합니다.
fn open_engine(global: &GlobalArgs, reindex: bool) -> Result<RetrievalEngine> {
    let data_dir = global.data_dir.clone().unwrap_or_else(get_data_dir);

    let mut config = EngineConfig::load(&data_dir).context("설정 로드 실패")?;
    if let Some(mode) = global.mode {
        config.chunk.mode = mode.into();
    }

    let embedder = create_embedder().context("임베딩 프로바이더 생성 실패")?;
    let composer = create_composer(&config.answer);

    let opened = if reindex {
        RetrievalEngine::open_reindexed(config, embedder)
    } else {
        RetrievalEngine::open(config, embedder)
    };

    let engine = match opened {
        Ok(engine) => engine,
        Err(e @ RagError::EmbedderMismatch { .. }) => bail!(
            "{}\n    GEMINI_API_KEY 설정을 확인하거나, 새로 수집하려면: helpdesk-rag ingest --reindex --dir <폴더>",
            e
        ),
        Err(e) => return Err(anyhow::Error::new(e).context("엔진 초기화 실패")),
    };

    Ok(engine.with_composer(composer))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
///
/// Ctrl-C를 누르면 현재 문서까지 처리한 뒤 멈춥니다.
async fn cmd_ingest(
    engine: &RetrievalEngine,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    pdf_only: bool,
) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        pdf_only,
        ..Default::default()
    });

    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!("    PDF: {}, 텍스트: {}", stats.pdf_files, stats.text_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
            eprintln!("\n[!] 중단 요청: 현재 문서까지 처리 후 멈춥니다");
        }
    });

    let paths: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
    let report = engine.ingest(&paths, &cancel).await;

    for (i, entry) in report.entries.iter().enumerate() {
        let file_name = entry
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let status = match &entry.status {
            IngestStatus::Added { chunks } => format!("완료 ({} 청크)", chunks),
            IngestStatus::Duplicate => "이미 수집됨".to_string(),
            IngestStatus::Empty => "텍스트 없음 (0 청크)".to_string(),
            IngestStatus::Failed(e) => format!("실패: {}", e),
        };

        println!("[{}/{}] {}... {}", i + 1, paths.len(), file_name, status);
    }

    println!();
    if report.cancelled {
        println!(
            "[!] 중단됨: {} 파일 처리 안 함",
            paths.len() - report.entries.len()
        );
    }
    println!(
        "[OK] 완료: 추가 {} ({} 청크), 중복 {}, 빈 문서 {}, 실패 {}",
        report.added(),
        report.total_chunks(),
        report.duplicates(),
        report.empty(),
        report.failed()
    );

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(engine: &RetrievalEngine, question: &str, review: bool) -> Result<()> {
    let answer = engine.ask(question).await.context("검색 실패")?;
    print_answer(&answer);

    if !review || !answer.is_found() {
        return Ok(());
    }

    println!();
    println!("답변이 맞습니까? [y/n] (Enter: 건너뛰기)");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("입력 읽기 실패")?;

    let verdict = match line.trim().to_lowercase().as_str() {
        "y" | "yes" | "д" | "да" => Verdict::Correct,
        "n" | "no" | "н" | "нет" => Verdict::Incorrect,
        _ => {
            println!("[*] 판정을 건너뜁니다.");
            return Ok(());
        }
    };

    record(engine, question, &answer, verdict).await
}

/// 판정 기록 명령어 (feedback)
async fn cmd_feedback(engine: &RetrievalEngine, question: &str, verdict: Verdict) -> Result<()> {
    let answer = engine.ask(question).await.context("검색 실패")?;
    if !answer.is_found() {
        println!("[!] 판정할 답변이 없습니다: {}", answer.text);
        return Ok(());
    }

    println!("답변: {}", truncate_text(&answer.text, 200));
    record(engine, question, &answer, verdict).await
}

async fn record(
    engine: &RetrievalEngine,
    question: &str,
    answer: &Answer,
    verdict: Verdict,
) -> Result<()> {
    engine
        .record_feedback(question, &answer.text, answer.chunks_used(), verdict)
        .await
        .context("피드백 저장 실패")?;

    match verdict {
        Verdict::Correct => println!("[OK] 피드백 감사합니다!"),
        Verdict::Incorrect => {
            println!("[OK] 기록했습니다.");
            if engine.config().exclusion == ExclusionPolicy::Blacklist {
                println!("     이 조각을 다시 보지 않으려면: helpdesk-rag mark-bad \"<조각>\"");
            }
        }
    }

    Ok(())
}

/// 블랙리스트 추가 명령어 (mark-bad)
async fn cmd_mark_bad(engine: &RetrievalEngine, fragment: &str) -> Result<()> {
    if fragment.trim().is_empty() {
        bail!("빈 조각은 추가할 수 없습니다");
    }

    if engine.mark_bad(fragment).await.context("블랙리스트 저장 실패")? {
        println!("[OK] 블랙리스트에 추가됨: {}", fragment.trim());
    } else {
        println!("[*] 이미 블랙리스트에 있습니다: {}", fragment.trim());
    }

    if let Some(notice) = blacklist_notice(engine.config().exclusion) {
        println!("{}", notice);
    }

    Ok(())
}

/// 블랙리스트가 검색에 쓰이지 않는 정책이면 안내 문구
fn blacklist_notice(policy: ExclusionPolicy) -> Option<&'static str> {
    match policy {
        ExclusionPolicy::Blacklist => None,
        ExclusionPolicy::Penalty { .. } => Some(
            "[!] 현재 제외 정책은 감점 방식이라 블랙리스트가 검색에 적용되지 않습니다.\n    \
             적용하려면 config.toml에서 [exclusion] mode = \"blacklist\"로 바꾸세요.",
        ),
    }
}

/// 문서 목록 명령어 (documents)
async fn cmd_documents(engine: &RetrievalEngine) -> Result<()> {
    let documents = engine.documents().await;

    if documents.is_empty() {
        println!("[!] 수집된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 수집된 문서 ({} 건):\n", documents.len());
    for (i, name) in documents.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, name);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(engine: &RetrievalEngine) -> Result<()> {
    let stats = engine.stats().await;

    println!("helpdesk-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", stats.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (오프라인 임베딩 사용, 번역 없음)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!("[OK] 임베딩: {} ({} 차원)", stats.embedder, stats.dimension);
    println!("[OK] 청커: {}", stats.chunker);
    match stats.exclusion {
        ExclusionPolicy::Blacklist => println!("[OK] 제외 정책: 블랙리스트"),
        ExclusionPolicy::Penalty { weight } => {
            println!("[OK] 제외 정책: 감점 (틀림 1건당 {})", weight)
        }
    }
    println!("[OK] 문서: {} 건, 청크: {} 개", stats.documents, stats.chunks);
    println!(
        "[OK] 블랙리스트 조각: {} 개, 피드백: {} 건",
        stats.bad_fragments, stats.feedback_entries
    );

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_answer(answer: &Answer) {
    if !answer.is_found() {
        println!("[!] {}", answer.text);
        return;
    }

    println!("{}", answer.text);

    if answer.raw_context != answer.text {
        println!();
        println!("--- 원문 ---");
        println!("{}", answer.raw_context);
    }

    if let Some(score) = answer.score {
        tracing::debug!("Answer score: {:.4}", score);
    }
}

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
