//! Retrieval Engine - 문서 수집과 질의응답
//!
//! 문서 등록부, 벡터 인덱스, 피드백 저장소를 하나로 묶습니다.
//!
//! - 수집: 해시 확인 → 페이지 추출 → 청킹 → 임베딩 → 인덱스 추가 → 저장
//! - 질의: 상위 K개 검색 → 블랙리스트/감점 적용 → 첫 후보로 답변 구성
//!
//! 임베딩은 잠금 밖에서 계산하고, 인덱스 변경과 저장은 쓰기 잠금 안에서
//! 수행합니다. 질의는 청크 수와 벡터 수가 다른 상태를 볼 수 없습니다.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::answer::AnswerComposer;
use crate::config::{EngineConfig, ExclusionPolicy};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::extract_pages;

use super::chunker::{build_chunker, Chunker};
use super::feedback::{FeedbackStore, Verdict};
use super::persist::move_aside;
use super::registry::{display_name, hash_file, DocumentRegistry, RegisterOutcome, METADATA_FILE};
use super::vector::{
    embedding_label, filter_short, FlatIndex, SearchResult, CHUNKS_FILE, INDEX_FILE,
};

/// 문서가 하나도 없을 때의 답변
pub const NO_DOCUMENTS: &str = "Сначала загрузите инструкции.";
/// 모든 후보가 제외되었을 때의 답변
pub const NO_SUITABLE_FRAGMENT: &str = "Не найдено подходящего фрагмента.";

// ============================================================================
// Types
// ============================================================================

/// 답변 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    /// 청크를 찾아 답변을 구성함
    Found,
    /// 인덱스가 비어 있음
    NoDocuments,
    /// 후보가 모두 블랙리스트에 걸림
    NoSuitableFragment,
}

/// 질의 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub kind: AnswerKind,
    /// 운영자에게 보여줄 답변 (센티넬이면 안내 문구)
    pub text: String,
    /// 번역 전 원문 맥락 (센티넬이면 빈 문자열)
    pub raw_context: String,
    /// 사용된 청크 원문
    pub chunk: Option<String>,
    /// 정책 적용 후 점수
    pub score: Option<f32>,
}

impl Answer {
    fn sentinel(kind: AnswerKind) -> Self {
        let text = match kind {
            AnswerKind::NoSuitableFragment => NO_SUITABLE_FRAGMENT,
            _ => NO_DOCUMENTS,
        };
        Self {
            kind,
            text: text.to_string(),
            raw_context: String::new(),
            chunk: None,
            score: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.kind == AnswerKind::Found
    }

    /// 피드백 기록용 청크 목록
    pub fn chunks_used(&self) -> Vec<String> {
        self.chunk.iter().cloned().collect()
    }
}

/// 문서별 수집 결과
#[derive(Debug, Clone, PartialEq)]
pub enum IngestStatus {
    Added { chunks: usize },
    Duplicate,
    Empty,
    Failed(String),
}

impl From<RegisterOutcome> for IngestStatus {
    fn from(outcome: RegisterOutcome) -> Self {
        match outcome {
            RegisterOutcome::Added { chunks } => IngestStatus::Added { chunks },
            RegisterOutcome::Duplicate => IngestStatus::Duplicate,
            RegisterOutcome::Empty => IngestStatus::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestEntry {
    pub path: PathBuf,
    pub status: IngestStatus,
}

/// 일괄 수집 보고서
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub entries: Vec<IngestEntry>,
    /// 취소되어 남은 문서를 처리하지 않음
    pub cancelled: bool,
}

impl IngestReport {
    pub fn added(&self) -> usize {
        self.count(|s| matches!(s, IngestStatus::Added { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|s| *s == IngestStatus::Duplicate)
    }

    pub fn empty(&self) -> usize {
        self.count(|s| *s == IngestStatus::Empty)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, IngestStatus::Failed(_)))
    }

    /// 추가된 청크 총합
    pub fn total_chunks(&self) -> usize {
        self.entries
            .iter()
            .map(|e| match e.status {
                IngestStatus::Added { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, predicate: impl Fn(&IngestStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.status)).count()
    }
}

/// 엔진 통계
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub bad_fragments: usize,
    pub feedback_entries: usize,
    pub embedder: String,
    pub chunker: &'static str,
    pub exclusion: ExclusionPolicy,
    pub data_dir: PathBuf,
}

/// 잠금으로 보호되는 영속 상태
struct EngineState {
    index: FlatIndex,
    registry: DocumentRegistry,
    feedback: FeedbackStore,
}

// ============================================================================
// RetrievalEngine
// ============================================================================

pub struct RetrievalEngine {
    config: EngineConfig,
    embedder: Box<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    composer: AnswerComposer,
    state: RwLock<EngineState>,
}

impl RetrievalEngine {
    /// 데이터 디렉토리에서 엔진 열기
    ///
    /// 인덱스가 없거나 손상되었으면 인덱스와 등록부를 함께 비웁니다 (손상된
    /// 파일은 옆으로 옮겨 둠). 인덱스를 만든 임베딩 모델이 현재 모델과 다르면
    /// `EmbedderMismatch`를 반환하고 아무것도 건드리지 않습니다.
    pub fn open(config: EngineConfig, embedder: Box<dyn EmbeddingProvider>) -> Result<Self> {
        let dir = config.data_dir.clone();
        std::fs::create_dir_all(&dir)?;

        let (index, registry) = load_index(&dir, embedder.name(), embedder.dimension())?;
        let feedback = FeedbackStore::open(&dir)?;
        let chunker = build_chunker(&config.chunk);
        let composer = AnswerComposer::new(config.answer.clone());

        tracing::info!(
            "Opened engine at {:?}: {} documents, {} chunks ({}, {})",
            dir,
            registry.len(),
            index.len(),
            embedder.name(),
            chunker.name()
        );

        Ok(Self {
            config,
            embedder,
            chunker,
            composer,
            state: RwLock::new(EngineState {
                index,
                registry,
                feedback,
            }),
        })
    }

    /// 기존 인덱스를 치우고 빈 인덱스로 열기 (임베딩 모델 교체용)
    ///
    /// 인덱스 파일과 등록부는 `<name>.replaced-<timestamp>`로 옮겨 둡니다.
    /// 피드백 로그와 블랙리스트는 유지됩니다.
    pub fn open_reindexed(
        config: EngineConfig,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        set_aside_index(&config.data_dir, "replaced")?;
        tracing::warn!("Starting a new index for {}", embedder.name());
        Self::open(config, embedder)
    }

    /// 번역기/생성기가 연결된 답변 구성기 사용
    pub fn with_composer(mut self, composer: AnswerComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------------

    /// 청크 직접 추가 (등록부 기록 없음)
    ///
    /// 최소 길이 미만 청크는 버립니다. 추가된 청크 수를 반환합니다.
    pub async fn add_chunks(&self, chunks: Vec<String>) -> Result<usize> {
        let chunks = filter_short(chunks, self.config.chunk.min_chunk_chars);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embed_chunks(&chunks).await?;

        let mut state = self.state.write().await;
        self.append(&mut state, chunks, embeddings)
    }

    /// 파일 하나 등록
    pub async fn register(&self, path: &Path) -> Result<RegisterOutcome> {
        let name = display_name(path);
        let hash = hash_file(path)?;

        if self.state.read().await.registry.contains(&hash) {
            tracing::info!("Skipping duplicate document: {}", name);
            return Ok(RegisterOutcome::Duplicate);
        }

        let pages = extract_pages(path)
            .await
            .map_err(|e| RagError::Extraction {
                path: path.to_path_buf(),
                details: format!("{:#}", e),
            })?;

        self.register_pages(&name, &hash, &pages).await
    }

    /// 추출된 페이지로 문서 등록
    ///
    /// 청크가 없으면 아무것도 기록하지 않습니다. 인덱스를 먼저 저장하고
    /// 등록부는 그 다음에 저장합니다.
    pub async fn register_pages(
        &self,
        name: &str,
        hash: &str,
        pages: &[String],
    ) -> Result<RegisterOutcome> {
        let chunks = filter_short(self.chunker.chunk(pages), self.config.chunk.min_chunk_chars);
        if chunks.is_empty() {
            tracing::warn!("No chunks extracted from document: {}", name);
            return Ok(RegisterOutcome::Empty);
        }

        let embeddings = self.embed_chunks(&chunks).await?;

        let mut state = self.state.write().await;
        // 잠금 밖에서 임베딩하는 동안 같은 문서가 등록되었을 수 있음
        if state.registry.contains(hash) {
            tracing::info!("Skipping duplicate document: {}", name);
            return Ok(RegisterOutcome::Duplicate);
        }

        let before = state.index.len();
        let added = self.append(&mut state, chunks, embeddings)?;

        state.registry.record(hash, name);
        if let Err(e) = state.registry.save() {
            // 같은 문서를 다시 시도할 수 있도록 둘 다 되돌림
            state.registry.forget(hash, name);
            state.index.truncate(before);
            if let Err(undo) = state.index.save(&self.config.data_dir) {
                tracing::warn!("Failed to roll back index after registry write error: {}", undo);
            }
            return Err(e);
        }

        tracing::info!("Added document: {} ({} chunks)", name, added);
        Ok(RegisterOutcome::Added { chunks: added })
    }

    /// 여러 파일 일괄 등록
    ///
    /// 문서 사이에서만 취소를 확인합니다. 한 문서의 실패는 보고서에 기록하고
    /// 다음 문서로 넘어갑니다.
    pub async fn ingest(&self, paths: &[PathBuf], cancel: &AtomicBool) -> IngestReport {
        let mut report = IngestReport::default();

        for (i, path) in paths.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                tracing::warn!("Ingest cancelled, {} documents left", paths.len() - i);
                report.cancelled = true;
                break;
            }

            tracing::debug!("Ingesting {}/{}: {:?}", i + 1, paths.len(), path);

            let status = match self.register(path).await {
                Ok(outcome) => outcome.into(),
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {}", path, e);
                    IngestStatus::Failed(e.to_string())
                }
            };

            report.entries.push(IngestEntry {
                path: path.clone(),
                status,
            });
        }

        tracing::info!(
            "Ingest finished: {} added, {} duplicate, {} empty, {} failed ({} chunks)",
            report.added(),
            report.duplicates(),
            report.empty(),
            report.failed(),
            report.total_chunks()
        );

        report
    }

    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder
            .embed_batch(chunks)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }

    /// 인덱스에 추가하고 저장 (저장 실패 시 메모리 상태도 되돌림)
    fn append(
        &self,
        state: &mut EngineState,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize> {
        let before = state.index.len();
        let added = state.index.insert(chunks, embeddings)?;

        if let Err(e) = state.index.save(&self.config.data_dir) {
            state.index.truncate(before);
            return Err(e);
        }

        tracing::debug!("Index now holds {} chunks", state.index.len());
        Ok(added)
    }

    // ------------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------------

    /// 질문에 답변
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyInput("question is blank".to_string()));
        }

        if self.state.read().await.index.is_empty() {
            return Ok(Answer::sentinel(AnswerKind::NoDocuments));
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let best = {
            let state = self.state.read().await;
            if query_embedding.len() != state.index.dimension() {
                return Err(RagError::DimensionMismatch {
                    expected: state.index.dimension(),
                    actual: query_embedding.len(),
                });
            }

            let candidates = state.index.search_vector(&query_embedding, self.config.top_k);
            select_candidate(candidates, &state.feedback, self.config.exclusion)
        };

        let (chunk, score) = match best {
            Some(best) => best,
            None => {
                tracing::info!("All candidates excluded for query: {}", query);
                return Ok(Answer::sentinel(AnswerKind::NoSuitableFragment));
            }
        };

        let composed = self.composer.compose(query, &chunk).await;

        Ok(Answer {
            kind: AnswerKind::Found,
            text: composed.answer,
            raw_context: composed.raw_context,
            chunk: Some(chunk),
            score: Some(score),
        })
    }

    // ------------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------------

    /// 운영자 판정 기록
    pub async fn record_feedback(
        &self,
        query: &str,
        answer: &str,
        chunks: Vec<String>,
        verdict: Verdict,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.feedback.record(query, answer, chunks, verdict)?;
        Ok(())
    }

    /// 조각을 블랙리스트에 추가 (새로 추가되었으면 true)
    pub async fn mark_bad(&self, fragment: &str) -> Result<bool> {
        self.state.write().await.feedback.mark_bad(fragment)
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// 등록된 문서 이름 (등록 순)
    pub async fn documents(&self) -> Vec<String> {
        self.state.read().await.registry.filenames().to_vec()
    }

    pub async fn stats(&self) -> EngineStats {
        let state = self.state.read().await;
        EngineStats {
            documents: state.registry.len(),
            chunks: state.index.len(),
            dimension: state.index.dimension(),
            bad_fragments: state.feedback.bad_fragments().count(),
            feedback_entries: state.feedback.entries().len(),
            embedder: self.embedder.name().to_string(),
            chunker: self.chunker.name(),
            exclusion: self.config.exclusion,
            data_dir: self.config.data_dir.clone(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 저장된 인덱스와 등록부 로드
///
/// 둘은 항상 같이 리셋됩니다. 등록부만 남아 있으면 같은 문서를 다시
/// 수집할 수 없게 되기 때문입니다.
fn load_index(
    dir: &Path,
    embedder: &str,
    dimension: usize,
) -> Result<(FlatIndex, DocumentRegistry)> {
    let fresh = || FlatIndex::for_embedder(embedder, dimension);

    match FlatIndex::load(dir) {
        Ok(index) if index.is_compatible(embedder, dimension) => {
            Ok((index, DocumentRegistry::open(dir)?))
        }
        Ok(index) if index.is_empty() => {
            tracing::info!(
                "Empty index built with {}, switching to {}",
                index.label(),
                embedding_label(embedder, dimension)
            );
            Ok((fresh(), DocumentRegistry::empty(dir)))
        }
        Ok(index) => Err(RagError::EmbedderMismatch {
            stored: index.label(),
            current: embedding_label(embedder, dimension),
        }),
        Err(RagError::NotFound(_)) => {
            let registry = DocumentRegistry::open(dir)?;
            if !registry.is_empty() {
                tracing::warn!("Index files missing, resetting document registry");
            }
            Ok((fresh(), DocumentRegistry::empty(dir)))
        }
        Err(RagError::Corrupt { path, details }) => {
            tracing::warn!("Unreadable index {:?}, starting empty: {}", path, details);
            set_aside_index(dir, "corrupt")?;
            Ok((fresh(), DocumentRegistry::empty(dir)))
        }
        Err(e) => Err(e),
    }
}

/// 인덱스 파일 한 쌍과 등록부를 함께 옆으로 옮김
fn set_aside_index(dir: &Path, reason: &str) -> Result<()> {
    for name in [INDEX_FILE, CHUNKS_FILE, METADATA_FILE] {
        move_aside(&dir.join(name), reason)?;
    }
    Ok(())
}

/// 제외 정책을 적용해 첫 후보 선택
fn select_candidate(
    candidates: Vec<SearchResult>,
    feedback: &FeedbackStore,
    policy: ExclusionPolicy,
) -> Option<(String, f32)> {
    match policy {
        ExclusionPolicy::Blacklist => candidates
            .into_iter()
            .find(|c| {
                let bad = feedback.is_bad(&c.chunk_text);
                if bad {
                    tracing::debug!("Skipping blacklisted chunk #{}", c.position);
                }
                !bad
            })
            .map(|c| (c.chunk_text, c.similarity)),
        ExclusionPolicy::Penalty { weight } => {
            let penalties = feedback.penalties(weight);
            let mut scored: Vec<(usize, String, f32)> = candidates
                .into_iter()
                .map(|c| {
                    let penalty = penalties.get(&c.chunk_text).copied().unwrap_or(0.0);
                    (c.position, c.chunk_text, c.similarity - penalty)
                })
                .collect();

            scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
            scored.into_iter().next().map(|(_, chunk, score)| (chunk, score))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
