//! 에러 타입
//!
//! 검색 엔진 코어의 에러 분류입니다. 어떤 에러도 프로세스를 종료시키지 않으며,
//! 엔진은 각 경로에서 안전한 기본값(센티넬)으로 복구합니다.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// 인덱스/메타데이터 파일 없음 (먼저 문서를 수집해야 함)
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// 손상된 저장 파일 (빈 상태로 리셋하여 복구)
    #[error("corrupt state in {path}: {details}")]
    Corrupt { path: PathBuf, details: String },

    /// 빈 입력 (공백뿐인 질문 등)
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// 임베딩 차원이 인덱스 차원과 다름
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 인덱스를 만든 임베딩 모델과 현재 모델이 다름 (명시적 재수집 필요)
    #[error("index was built with {stored}, current embedder is {current}")]
    EmbedderMismatch { stored: String, current: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    /// 문서 텍스트 추출 실패 (PDF 파싱 등)
    #[error("failed to extract text from {path}: {details}")]
    Extraction { path: PathBuf, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// 호출자가 문서 수집으로 복구할 수 있는 에러인지
    pub fn is_not_found(&self) -> bool {
        matches!(self, RagError::NotFound(_))
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
