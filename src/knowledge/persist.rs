//! 파일 저장 헬퍼
//!
//! 모든 쓰기는 같은 디렉토리의 임시 파일에 쓴 뒤 rename 합니다.
//! 쓰기 도중 중단되어도 기존 파일은 온전히 남습니다.
//! 읽을 수 없는 파일은 덮어쓰지 않고 `<name>.<reason>-<timestamp>`로 옮겨 둡니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RagError, Result};

/// 바이트를 원자적으로 기록
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RagError::Io(e.error))?;

    Ok(())
}

/// JSON을 원자적으로 기록 (사람이 읽을 수 있게 pretty)
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// JSON 읽기
///
/// 파일이 없으면 `NotFound`, 파싱 실패는 `Corrupt`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RagError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes).map_err(|e| RagError::Corrupt {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// JSON 읽기 (없거나 손상되었으면 기본값)
///
/// 손상된 파일은 다음 쓰기에 덮어써지지 않도록 먼저 옆으로 옮깁니다.
/// 옮기지 못하면 에러를 반환합니다.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match read_json(path) {
        Ok(value) => Ok(value),
        Err(RagError::NotFound(_)) => Ok(T::default()),
        Err(RagError::Corrupt { details, .. }) => {
            tracing::warn!("Unreadable state file {:?}, starting empty: {}", path, details);
            move_aside(path, "corrupt")?;
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// 파일을 `<name>.<reason>-<timestamp>`로 이름 변경 (없으면 None)
pub fn move_aside(path: &Path, reason: &str) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let target = path.with_file_name(format!("{}.{}-{}", name, reason, stamp));

    std::fs::rename(path, &target)?;
    tracing::warn!("Moved {:?} aside to {:?}", path, target);
    Ok(Some(target))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("list.json");

        write_json_atomic(&path, &vec!["один", "два"]).unwrap();
        let loaded: Vec<String> = read_json(&path).unwrap();

        assert_eq!(loaded, vec!["один", "два"]);
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &1u32).unwrap();
        write_json_atomic(&path, &2u32).unwrap();

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
        assert_eq!(read_json::<u32>(&path).unwrap(), 2);
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        assert!(read_json::<Vec<String>>(&path).unwrap_err().is_not_found());
        assert!(read_json_or_default::<Vec<String>>(&path).unwrap().is_empty());

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_json::<Vec<String>>(&path),
            Err(RagError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"["dc-in", "8-800"#).unwrap();

        assert!(read_json_or_default::<Vec<String>>(&path).unwrap().is_empty());
        assert!(!path.exists());

        let backups: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("state.json.corrupt-"), "{}", name);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), r#"["dc-in", "8-800"#);
    }

    #[test]
    fn test_move_aside_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(move_aside(&dir.path().join("none.json"), "replaced").unwrap().is_none());
    }
}
