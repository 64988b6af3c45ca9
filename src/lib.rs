//! helpdesk-rag - 1선 지원 엔지니어용 매뉴얼 검색 엔진
//!
//! PDF 매뉴얼을 청크로 나누어 평면 벡터 인덱스에 저장하고, 질문에 가장
//! 가까운 조각을 답변으로 돌려줍니다. 운영자가 무관하다고 표시한 조각은
//! 이후 답변에서 제외됩니다.

pub mod answer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod knowledge;

// Re-exports
pub use answer::{AnswerComposer, AnswerConfig, Generator, Translator};
pub use config::{get_data_dir, EngineConfig, ExclusionPolicy};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, HashingEmbedding};
pub use error::{RagError, Result};
pub use gemini::{get_api_key, has_api_key};
pub use knowledge::{
    Answer, AnswerKind, ChunkConfig, ChunkMode, Chunker, FeedbackStore, FlatIndex, IngestReport,
    RegisterOutcome, RetrievalEngine, Verdict,
};
