//! 페이지 텍스트 추출 모듈
//!
//! 매뉴얼 파일에서 원시 페이지 텍스트를 추출합니다. 청크 분할은
//! `knowledge::chunker`가 담당합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - 텍스트 파일: 직접 읽기, 폼피드로 페이지 구분

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

/// 파일에서 페이지 텍스트 추출
///
/// 형식은 확장자로 판단합니다.
pub async fn extract_pages(path: &Path) -> Result<Vec<String>> {
    let file_type = FileType::from_path(path)
        .with_context(|| format!("Unsupported manual format: {:?}", path))?;

    extract_pages_as(path, file_type).await
}

/// 지정한 형식으로 페이지 텍스트 추출
pub async fn extract_pages_as(path: &Path, file_type: FileType) -> Result<Vec<String>> {
    let pages = match file_type {
        FileType::Text => extract_text(path).await?,
        FileType::Pdf => extract_pdf(path).await?,
    };

    tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

/// 텍스트 파일에서 추출
async fn extract_text(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes);

    Ok(pdf::split_pages(&text))
}

/// PDF 파일에서 추출
async fn extract_pdf(path: &Path) -> Result<Vec<String>> {
    // PDF 추출은 CPU 바운드이고 손상된 파일에서 panic 할 수 있으므로 spawn_blocking 사용
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf::extract_pages_from_pdf(&path))
        .await
        .context("PDF extraction task failed")?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual.txt");
        std::fs::write(
            &path,
            "Глава 1. Питание\nПодключите блок питания.\x0cГлава 2. Сеть\nНастройте VLAN.",
        )
        .unwrap();

        let pages = extract_pages(&path).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].starts_with("Глава 2. Сеть"));
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        assert!(extract_pages(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_broken_pdf_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        assert!(extract_pages(&path).await.is_err());
    }
}
