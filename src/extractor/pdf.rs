//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// "--- Page 3 ---" 같은 페이지 구분 줄
static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("page marker regex is valid")
});

/// PDF에서 페이지별 텍스트 추출
///
/// 텍스트 레이어가 없는 스캔 문서는 빈 목록을 반환합니다.
pub fn extract_pages_from_pdf(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pages(&text))
}

/// 추출된 텍스트를 페이지별로 분리
///
/// 폼피드(`\x0c`)를 우선 사용하고, 없으면 페이지 구분 줄로 나눕니다.
pub fn split_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    if PAGE_MARKER.is_match(text) {
        let pages: Vec<String> = PAGE_MARKER
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    if text.trim().is_empty() {
        vec![]
    } else {
        vec![text.trim().to_string()]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_with_formfeed() {
        let pages = split_pages("Страница 1\x0cСтраница 2\x0c\x0cСтраница 3");
        assert_eq!(pages, vec!["Страница 1", "Страница 2", "Страница 3"]);
    }

    #[test]
    fn test_split_pages_with_markers() {
        let text = "Введение\n--- Page 1 ---\nПодключение питания\n--- Page 2 ---\nНастройка VLAN";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], "Подключение питания");
    }

    #[test]
    fn test_split_pages_single_and_empty() {
        assert_eq!(split_pages("Просто текст без разрывов"), vec!["Просто текст без разрывов"]);
        assert!(split_pages("  \n ").is_empty());
    }
}
