//! Feedback Store - 운영자 판정 기록과 블랙리스트
//!
//! - 피드백 로그 (`feedback.json`): 질문/답변/사용된 청크/판정의 추가 전용 기록
//! - 블랙리스트 (`bad_fragments.json`): 무관하다고 표시된 조각 집합
//!
//! 조각은 공백 정규화 + 소문자화한 형태로 비교합니다. 조각이 청크의 일부이기만
//! 해도 (예: 바뀐 전화번호) 청크 전체가 제외됩니다.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::chunker::normalize_whitespace;
use super::persist::{read_json_or_default, write_json_atomic};

/// 피드백 로그 파일 이름
pub const FEEDBACK_FILE: &str = "feedback.json";
/// 블랙리스트 파일 이름
pub const BAD_FRAGMENTS_FILE: &str = "bad_fragments.json";

// ============================================================================
// Types
// ============================================================================

/// 운영자 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    pub fn from_bool(is_correct: bool) -> Self {
        if is_correct {
            Verdict::Correct
        } else {
            Verdict::Incorrect
        }
    }
}

/// 피드백 로그 항목 (수정/삭제 없음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub answer: String,
    pub chunks: Vec<String>,
    pub verdict: Verdict,
}

/// 청크 텍스트 → 누적 감점
pub type PenaltyMap = HashMap<String, f32>;

// ============================================================================
// FeedbackStore
// ============================================================================

pub struct FeedbackStore {
    log_path: PathBuf,
    bad_path: PathBuf,
    entries: Vec<FeedbackEntry>,
    bad_fragments: BTreeSet<String>,
}

impl FeedbackStore {
    /// 디렉토리에서 열기
    ///
    /// 파일이 없으면 빈 상태입니다. 손상된 파일은 옆으로 옮겨 보존한 뒤
    /// 빈 상태로 시작합니다.
    pub fn open(dir: &Path) -> Result<Self> {
        let log_path = dir.join(FEEDBACK_FILE);
        let bad_path = dir.join(BAD_FRAGMENTS_FILE);

        let entries: Vec<FeedbackEntry> = read_json_or_default(&log_path)?;
        let stored: Vec<String> = read_json_or_default(&bad_path)?;
        let bad_fragments = stored
            .iter()
            .map(|f| normalize_fragment(f))
            .filter(|f| !f.is_empty())
            .collect();

        Ok(Self {
            log_path,
            bad_path,
            entries,
            bad_fragments,
        })
    }

    /// 판정 기록 후 저장
    pub fn record(
        &mut self,
        query: &str,
        answer: &str,
        chunks: Vec<String>,
        verdict: Verdict,
    ) -> Result<&FeedbackEntry> {
        self.entries.push(FeedbackEntry {
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: answer.to_string(),
            chunks,
            verdict,
        });

        if let Err(e) = write_json_atomic(&self.log_path, &self.entries) {
            self.entries.pop();
            return Err(e);
        }

        let entry = &self.entries[self.entries.len() - 1];
        tracing::info!("Recorded {:?} feedback for query: {}", entry.verdict, entry.query);
        Ok(entry)
    }

    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    /// 조각을 블랙리스트에 추가 (새로 추가되었으면 true)
    ///
    /// 같은 조각을 여러 번 표시해도 결과는 같습니다.
    pub fn mark_bad(&mut self, fragment: &str) -> Result<bool> {
        let normalized = normalize_fragment(fragment);
        if normalized.is_empty() || self.bad_fragments.contains(&normalized) {
            return Ok(false);
        }

        self.bad_fragments.insert(normalized.clone());
        if let Err(e) = write_json_atomic(&self.bad_path, &self.bad_fragments) {
            self.bad_fragments.remove(&normalized);
            return Err(e);
        }

        tracing::info!("Marked fragment as bad: {}", normalized);
        Ok(true)
    }

    /// 블랙리스트 조각이 청크에 포함되어 있는지
    pub fn is_bad(&self, chunk: &str) -> bool {
        if self.bad_fragments.is_empty() {
            return false;
        }
        let normalized = normalize_fragment(chunk);
        self.bad_fragments
            .iter()
            .any(|fragment| normalized.contains(fragment.as_str()))
    }

    pub fn bad_fragments(&self) -> impl Iterator<Item = &str> {
        self.bad_fragments.iter().map(String::as_str)
    }

    /// "틀림" 판정 로그를 재생하여 청크별 감점 계산
    pub fn penalties(&self, weight: f32) -> PenaltyMap {
        let mut map = PenaltyMap::new();
        for entry in self.entries.iter().filter(|e| e.verdict == Verdict::Incorrect) {
            for chunk in &entry.chunks {
                *map.entry(chunk.clone()).or_insert(0.0) += weight;
            }
        }
        map
    }
}

/// 비교용 정규화 (공백 축약 + 소문자)
pub fn normalize_fragment(text: &str) -> String {
    normalize_whitespace(text).to_lowercase()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_feedback() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();

        store
            .record(
                "Как подключить питание?",
                "Используйте разъём DC-IN.",
                vec!["Используйте разъём DC-IN.".to_string()],
                Verdict::Correct,
            )
            .unwrap();

        let reopened = FeedbackStore::open(dir.path()).unwrap();
        assert_eq!(reopened.entries().len(), 1);
        let entry = &reopened.entries()[0];
        assert_eq!(entry.query, "Как подключить питание?");
        assert_eq!(entry.answer, "Используйте разъём DC-IN.");
        assert_eq!(entry.verdict, Verdict::Correct);
    }

    #[test]
    fn test_multiple_entries_keep_order() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();

        store.record("Вопрос 1", "Ответ 1", vec!["Чанк 1".into()], Verdict::Correct).unwrap();
        store.record("Вопрос 2", "Ответ 2", vec!["Чанк 2".into()], Verdict::from_bool(false)).unwrap();

        let reopened = FeedbackStore::open(dir.path()).unwrap();
        let verdicts: Vec<Verdict> = reopened.entries().iter().map(|e| e.verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Correct, Verdict::Incorrect]);
    }

    #[test]
    fn test_log_file_is_json_array() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();
        store.record("q", "a", vec![], Verdict::Incorrect).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(FEEDBACK_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["verdict"], "incorrect");
        assert!(value[0]["timestamp"].is_string());
    }

    #[test]
    fn test_mark_bad_normalizes_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();

        assert!(store.mark_bad("  8-800-XXX-XX-XX ").unwrap());
        assert!(!store.mark_bad("8-800-xxx-xx-xx").unwrap());
        assert!(!store.mark_bad("   ").unwrap());

        assert_eq!(store.bad_fragments().count(), 1);
        assert!(store.is_bad("Звоните по номеру 8-800-XXX-XX-XX круглосуточно."));
        assert!(store.is_bad("ЗВОНИТЕ   8-800-xxx-XX-XX"));
        assert!(!store.is_bad("Звоните в службу поддержки."));

        let reopened = FeedbackStore::open(dir.path()).unwrap();
        assert!(reopened.is_bad("номер 8-800-XXX-XX-XX"));
    }

    #[test]
    fn test_whitespace_inside_fragment() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();
        store.mark_bad("разъём\n  DC-IN").unwrap();

        assert!(store.is_bad("Используйте разъём DC-IN."));
    }

    #[test]
    fn test_penalties_replay_incorrect_only() {
        let dir = TempDir::new().unwrap();
        let mut store = FeedbackStore::open(dir.path()).unwrap();

        store.record("q1", "a", vec!["A".into()], Verdict::Incorrect).unwrap();
        store.record("q2", "a", vec!["A".into(), "B".into()], Verdict::Incorrect).unwrap();
        store.record("q3", "a", vec!["C".into()], Verdict::Correct).unwrap();

        let penalties = store.penalties(0.1);
        assert!((penalties["A"] - 0.2).abs() < 1e-6);
        assert!((penalties["B"] - 0.1).abs() < 1e-6);
        assert!(!penalties.contains_key("C"));
    }

    /// `<name>.corrupt-*` 백업 파일 내용
    fn backup_of(dir: &Path, name: &str) -> String {
        let prefix = format!("{}.corrupt-", name);
        let backup = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.file_name().unwrap().to_str().unwrap().starts_with(&prefix))
            .unwrap_or_else(|| panic!("no backup for {}", name));
        std::fs::read_to_string(backup).unwrap()
    }

    #[test]
    fn test_corrupt_files_are_preserved() {
        let dir = TempDir::new().unwrap();
        let truncated_bad = r#"["dc-in", "8-800"#;
        let malformed_log = r#"[{"timestamp": "2026-01-01T00:00:00Z", "query": "q", "answer": "a", "chunks": [], "verdict": "correct"}, {"query": 1}]"#;
        std::fs::write(dir.path().join(BAD_FRAGMENTS_FILE), truncated_bad).unwrap();
        std::fs::write(dir.path().join(FEEDBACK_FILE), malformed_log).unwrap();

        let mut store = FeedbackStore::open(dir.path()).unwrap();
        assert!(store.entries().is_empty());
        assert_eq!(store.bad_fragments().count(), 0);

        // 새 기록은 가능하고 원본은 백업에 그대로 남음
        store.mark_bad("vlan").unwrap();
        store.record("q2", "a2", vec![], Verdict::Correct).unwrap();

        assert_eq!(backup_of(dir.path(), BAD_FRAGMENTS_FILE), truncated_bad);
        assert_eq!(backup_of(dir.path(), FEEDBACK_FILE), malformed_log);

        let reopened = FeedbackStore::open(dir.path()).unwrap();
        assert_eq!(reopened.entries().len(), 1);
        assert_eq!(reopened.bad_fragments().collect::<Vec<_>>(), ["vlan"]);
    }
}
