//! 엔진 설정
//!
//! 설정 파일: `<data_dir>/config.toml` (없으면 기본값)
//! 데이터 디렉토리: ~/.helpdesk-rag/
//!
//! ```toml
//! top_k = 20
//!
//! [chunk]
//! mode = "chapter"
//! words_per_chunk = 200
//!
//! [exclusion]
//! mode = "penalty"
//! weight = 0.15
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::answer::AnswerConfig;
use crate::knowledge::ChunkConfig;

/// 설정 파일 이름
pub const CONFIG_FILE: &str = "config.toml";

/// 데이터 디렉토리 경로 (~/.helpdesk-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".helpdesk-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 잘못된 답변을 걸러내는 정책
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExclusionPolicy {
    /// 블랙리스트 조각을 포함한 청크는 절대 반환하지 않음
    Blacklist,
    /// "틀림" 판정 1건마다 해당 청크 점수에서 weight를 감점
    Penalty { weight: f32 },
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        ExclusionPolicy::Blacklist
    }
}

/// 엔진 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 인덱스/메타데이터/피드백 저장 위치
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 필터링 전에 가져올 후보 수
    pub top_k: usize,
    /// 제외 정책
    pub exclusion: ExclusionPolicy,
    /// 답변 후처리 (번역, 생성, 줄바꿈)
    pub answer: AnswerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            top_k: 20,
            exclusion: ExclusionPolicy::default(),
            answer: AnswerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 지정된 데이터 디렉토리의 기본 설정
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// `<data_dir>/config.toml` 로드 (없으면 기본값)
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {:?}", path))?;
            let config: EngineConfig = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {:?}", path))?;
            tracing::debug!("Loaded config from {:?}", path);
            config
        } else {
            EngineConfig::default()
        };

        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// 값 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk.words_per_chunk == 0 {
            anyhow::bail!("chunk.words_per_chunk must be greater than 0");
        }
        if self.top_k == 0 {
            anyhow::bail!("top_k must be greater than 0");
        }
        if let ExclusionPolicy::Penalty { weight } = self.exclusion {
            if !weight.is_finite() || weight < 0.0 {
                anyhow::bail!("exclusion.weight must be a non-negative number, got {}", weight);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ChunkMode;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();

        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.top_k, 20);
        assert_eq!(config.exclusion, ExclusionPolicy::Blacklist);
        assert_eq!(config.chunk.mode, ChunkMode::Flat);
    }

    #[test]
    fn test_load_partial_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
top_k = 5

[chunk]
mode = "chapter"
words_per_chunk = 100

[exclusion]
mode = "penalty"
weight = 0.25
"#,
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.chunk.mode, ChunkMode::Chapter);
        assert_eq!(config.chunk.words_per_chunk, 100);
        // 지정하지 않은 값은 기본값 유지
        assert_eq!(config.chunk.min_chunk_chars, ChunkConfig::default().min_chunk_chars);
        assert_eq!(config.exclusion, ExclusionPolicy::Penalty { weight: 0.25 });
    }

    #[test]
    fn test_load_answer_section() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[answer]\ngenerate = true\nreflow = false\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert!(config.answer.generate);
        assert!(!config.answer.reflow);
        assert_eq!(config.answer.target_lang, "ru");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "top_k = 0\n").unwrap();
        assert!(EngineConfig::load(dir.path()).is_err());

        std::fs::write(dir.path().join(CONFIG_FILE), "top_k = [").unwrap();
        assert!(EngineConfig::load(dir.path()).is_err());
    }
}
