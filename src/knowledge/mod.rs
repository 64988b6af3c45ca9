//! Knowledge 모듈 - 매뉴얼 검색 저장소
//!
//! - Rules: 노이즈 줄 / 장 제목 판별 규칙 표
//! - Chunker: 페이지 텍스트 → 청크 (고정 크기 / 장 단위)
//! - Vector: 정확한 내적 검색 인덱스
//! - Registry: 콘텐츠 해시 기반 문서 중복 제거
//! - Feedback: 판정 로그 + 블랙리스트
//! - Engine: 수집과 질의응답

mod chunker;
mod engine;
mod feedback;
mod persist;
mod registry;
mod rules;
mod vector;

// Re-exports
pub use chunker::{
    build_chunker, chunk_text, default_chunker, normalize_whitespace, ChapterChunker, ChunkConfig,
    ChunkMode, Chunker, FlatChunker,
};
pub use engine::{
    Answer, AnswerKind, EngineStats, IngestEntry, IngestReport, IngestStatus, RetrievalEngine,
    NO_DOCUMENTS, NO_SUITABLE_FRAGMENT,
};
pub use feedback::{
    normalize_fragment, FeedbackEntry, FeedbackStore, PenaltyMap, Verdict, BAD_FRAGMENTS_FILE,
    FEEDBACK_FILE,
};
pub use registry::{
    display_name, hash_file, DocumentMetadata, DocumentRegistry, RegisterOutcome, METADATA_FILE,
};
pub use rules::{
    is_chapter_heading, is_junk_line, HeadingClassifier, JunkClassifier, LineRule,
};
pub use vector::{
    cosine_similarity, embedding_label, filter_short, FlatIndex, SearchResult, CHUNKS_FILE,
    INDEX_FILE,
};
