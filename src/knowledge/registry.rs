//! Document Registry - 콘텐츠 해시 기반 문서 중복 제거
//!
//! 파일 바이트의 SHA-256으로 문서를 식별합니다. 파일 이름이 달라도 내용이
//! 같으면 같은 문서입니다.
//! 저장 위치: `<data_dir>/documents.json`

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::persist::{read_json_or_default, write_json_atomic};

/// 메타데이터 파일 이름
pub const METADATA_FILE: &str = "documents.json";

/// 해시 계산 시 읽기 블록 크기
const HASH_BLOCK_SIZE: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

/// 문서 등록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// 새 문서, 청크 추가됨
    Added { chunks: usize },
    /// 같은 내용의 문서가 이미 등록됨
    Duplicate,
    /// 청크가 하나도 추출되지 않음 (등록하지 않음)
    Empty,
}

impl RegisterOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, RegisterOutcome::Added { .. })
    }

    /// 추가된 청크 수
    pub fn chunks(&self) -> usize {
        match self {
            RegisterOutcome::Added { chunks } => *chunks,
            _ => 0,
        }
    }
}

/// 저장 형식
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub hashes: BTreeSet<String>,
    #[serde(default)]
    pub filenames: Vec<String>,
}

// ============================================================================
// DocumentRegistry
// ============================================================================

/// 등록된 문서 목록
#[derive(Debug, Clone)]
pub struct DocumentRegistry {
    path: PathBuf,
    metadata: DocumentMetadata,
}

impl DocumentRegistry {
    /// 디렉토리에서 열기 (파일이 없거나 손상되었으면 빈 목록)
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let metadata: DocumentMetadata = read_json_or_default(&path)?;

        tracing::debug!(
            "Document registry at {:?}: {} documents",
            path,
            metadata.hashes.len()
        );

        Ok(Self { path, metadata })
    }

    /// 빈 목록 (저장 파일은 건드리지 않음)
    pub fn empty(dir: &Path) -> Self {
        Self {
            path: dir.join(METADATA_FILE),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.metadata.hashes.contains(hash)
    }

    /// 문서 기록 (이미 있으면 false)
    pub fn record(&mut self, hash: &str, name: &str) -> bool {
        if !self.metadata.hashes.insert(hash.to_string()) {
            return false;
        }
        self.metadata.filenames.push(name.to_string());
        true
    }

    /// `record` 되돌리기 (저장 실패 시)
    pub fn forget(&mut self, hash: &str, name: &str) {
        if !self.metadata.hashes.remove(hash) {
            return;
        }
        if let Some(pos) = self.metadata.filenames.iter().rposition(|n| n == name) {
            self.metadata.filenames.remove(pos);
        }
    }

    /// 등록 순서대로 파일 이름
    pub fn filenames(&self) -> &[String] {
        &self.metadata.filenames
    }

    pub fn len(&self) -> usize {
        self.metadata.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.hashes.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.metadata)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 파일 내용의 SHA-256 (고정 블록 단위로 스트리밍)
pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let read = reader.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// 표시용 파일 이름
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identical_content_same_hash() {
        let dir = TempDir::new().unwrap();
        let file1 = dir.path().join("file1.txt");
        let file2 = dir.path().join("file2.txt");
        std::fs::write(&file1, "Одинаковое содержимое для проверки хеша.").unwrap();
        std::fs::write(&file2, "Одинаковое содержимое для проверки хеша.").unwrap();

        assert_eq!(hash_file(&file1).unwrap(), hash_file(&file2).unwrap());

        std::fs::write(&file2, "Другое содержимое.").unwrap();
        assert_ne!(hash_file(&file1).unwrap(), hash_file(&file2).unwrap());
    }

    #[test]
    fn test_hash_spans_multiple_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; HASH_BLOCK_SIZE * 2 + 17];
        std::fs::write(&path, &data).unwrap();

        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(hash_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_record_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut registry = DocumentRegistry::open(dir.path()).unwrap();

        assert!(registry.record("abc", "manual1.pdf"));
        assert!(!registry.record("abc", "copy-of-manual1.pdf"));
        assert!(registry.record("def", "guide2.pdf"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.filenames(), ["manual1.pdf", "guide2.pdf"]);

        registry.forget("def", "guide2.pdf");
        registry.forget("zzz", "manual1.pdf");
        assert!(!registry.contains("def"));
        assert_eq!(registry.filenames(), ["manual1.pdf"]);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let mut registry = DocumentRegistry::open(dir.path()).unwrap();
        registry.record("abc", "manual1.pdf");
        registry.save().unwrap();

        let reopened = DocumentRegistry::open(dir.path()).unwrap();
        assert!(reopened.contains("abc"));
        assert_eq!(reopened.filenames(), ["manual1.pdf"]);
    }

    #[test]
    fn test_corrupt_metadata_resets() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "[[[").unwrap();

        let registry = DocumentRegistry::open(dir.path()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.filenames().is_empty());
        assert!(!dir.path().join(METADATA_FILE).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("/tmp/docs/manual.pdf")), "manual.pdf");
    }
}
