//! Text Chunking Module
//!
//! PDF 페이지 텍스트를 검색용 청크로 분할합니다.
//!
//! - Flat: 전체 텍스트에서 노이즈 줄 제거 후 N 단어 단위로 분할
//! - Chapter: 장 제목을 기준으로 묶은 뒤 장별로 N 단어 단위로 분할
//!   (첫 제목 이전의 텍스트는 버림, 서로 다른 장은 한 청크에 섞이지 않음)

use serde::{Deserialize, Serialize};

use super::rules::{default_boilerplate, HeadingClassifier, JunkClassifier, DEFAULT_MIN_LINE_CHARS};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// 전체 텍스트를 고정 크기 윈도우로 분할
    #[default]
    Flat,
    /// 장 제목 기준으로 묶은 뒤 분할
    Chapter,
}

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 청킹 방식
    pub mode: ChunkMode,
    /// 청크 당 단어 수
    pub words_per_chunk: usize,
    /// 청크 간 중첩 단어 수
    pub overlap_words: usize,
    /// 최소 청크 크기 (문자 수), 미만은 버림
    pub min_chunk_chars: usize,
    /// 최소 줄 길이 (문자 수), 미만은 노이즈
    pub min_line_chars: usize,
    /// 노이즈로 볼 문구 (대소문자 무시)
    pub boilerplate: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            mode: ChunkMode::Flat,
            words_per_chunk: 256,
            overlap_words: 0,
            min_chunk_chars: 30,
            min_line_chars: DEFAULT_MIN_LINE_CHARS,
            boilerplate: default_boilerplate(),
        }
    }
}

impl ChunkConfig {
    /// 장 단위 청킹 설정
    pub fn chapters() -> Self {
        Self {
            mode: ChunkMode::Chapter,
            words_per_chunk: 200,
            ..Default::default()
        }
    }

    fn junk_classifier(&self) -> JunkClassifier {
        JunkClassifier::new(self.min_line_chars, &self.boilerplate)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 페이지 텍스트 목록을 청크로 분할
    fn chunk(&self, pages: &[String]) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// FlatChunker
// ============================================================================

/// 고정 크기 청커
pub struct FlatChunker {
    config: ChunkConfig,
    junk: JunkClassifier,
}

impl FlatChunker {
    pub fn new(config: ChunkConfig) -> Self {
        let junk = config.junk_classifier();
        Self { config, junk }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl Chunker for FlatChunker {
    fn chunk(&self, pages: &[String]) -> Vec<String> {
        let clean: Vec<&str> = pages
            .iter()
            .flat_map(|page| page.lines())
            .map(str::trim)
            .filter(|line| !self.junk.is_junk(line))
            .collect();

        if clean.is_empty() {
            return vec![];
        }

        window(&clean.join(" "), &self.config)
    }

    fn name(&self) -> &'static str {
        "FlatChunker"
    }
}

// ============================================================================
// ChapterChunker
// ============================================================================

/// 장 인식 청커
pub struct ChapterChunker {
    config: ChunkConfig,
    junk: JunkClassifier,
    headings: HeadingClassifier,
}

impl ChapterChunker {
    pub fn new(config: ChunkConfig) -> Self {
        let junk = config.junk_classifier();
        Self {
            config,
            junk,
            headings: HeadingClassifier::default(),
        }
    }

    /// 줄을 장 단위로 묶기 (제목 줄 포함)
    fn split_chapters<'a>(&self, lines: impl Iterator<Item = &'a str>) -> Vec<Vec<&'a str>> {
        let mut chapters: Vec<Vec<&str>> = Vec::new();

        for line in lines.map(str::trim) {
            if self.headings.is_heading(line) {
                chapters.push(vec![line]);
                continue;
            }

            if self.junk.is_junk(line) {
                continue;
            }

            // 첫 제목 전의 텍스트는 버림
            if let Some(current) = chapters.last_mut() {
                current.push(line);
            }
        }

        chapters
    }
}

impl Chunker for ChapterChunker {
    fn chunk(&self, pages: &[String]) -> Vec<String> {
        let lines = pages.iter().flat_map(|page| page.lines());
        let chapters = self.split_chapters(lines);

        tracing::debug!("Detected {} chapters", chapters.len());

        chapters
            .into_iter()
            .flat_map(|chapter| window(&chapter.join(" "), &self.config))
            .collect()
    }

    fn name(&self) -> &'static str {
        "ChapterChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 공백 정규화 (연속 공백/줄바꿈 → 공백 하나)
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 텍스트를 단어 단위 청크로 분할
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 청크 당 단어 수
/// * `overlap` - 청크 간 중첩 단어 수
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        start += step;
    }

    chunks
}

/// 윈도우 분할 후 최소 길이 미만 청크 제거
fn window(text: &str, config: &ChunkConfig) -> Vec<String> {
    chunk_text(text, config.words_per_chunk, config.overlap_words)
        .into_iter()
        .filter(|chunk| chunk.chars().count() >= config.min_chunk_chars)
        .collect()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정에 맞는 청커 생성
pub fn build_chunker(config: &ChunkConfig) -> Box<dyn Chunker> {
    match config.mode {
        ChunkMode::Flat => Box::new(FlatChunker::new(config.clone())),
        ChunkMode::Chapter => Box::new(ChapterChunker::new(config.clone())),
    }
}

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(FlatChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn small_config(mode: ChunkMode) -> ChunkConfig {
        ChunkConfig {
            mode,
            words_per_chunk: 8,
            min_chunk_chars: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = FlatChunker::with_defaults();
        assert!(chunker.chunk(&[]).is_empty());
        assert!(chunker.chunk(&pages(&["", "   \n  "])).is_empty());
    }

    #[test]
    fn test_flat_strips_noise_lines() {
        let chunker = FlatChunker::new(small_config(ChunkMode::Flat));
        let input = pages(&[
            "Руководство пользователя\n12\nhttp://vendor.example\nПодключите блок питания к разъёму DC-IN.",
            "© 2024 Vendor\nЗатем включите   устройство кнопкой POWER.\nPage 2",
        ]);

        let chunks = chunker.chunk(&input);
        let joined = chunks.join(" ");

        assert!(joined.contains("DC-IN"));
        assert!(joined.contains("POWER"));
        assert!(!joined.contains("http"));
        assert!(!joined.contains("©"));
        assert!(!joined.contains("Page 2"));
        // 공백 정규화
        assert!(!joined.contains("  "));
        for chunk in &chunks {
            assert!(chunk.split_whitespace().count() <= 8);
        }
    }

    #[test]
    fn test_flat_drops_short_windows() {
        let config = ChunkConfig {
            words_per_chunk: 5,
            min_chunk_chars: 20,
            ..Default::default()
        };
        let chunker = FlatChunker::new(config);

        let chunks = chunker.chunk(&pages(&[
            "Первая строка руководства пользователя конец.",
        ]));
        assert_eq!(chunks, vec!["Первая строка руководства пользователя конец."]);

        // 마지막 윈도우 "конец текста." 은 20자 미만
        let chunks = chunker.chunk(&pages(&[
            "Первая строка руководства пользователя оборудования\nконец текста.",
        ]));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Первая"));
    }

    #[test]
    fn test_chapter_groups_by_heading() {
        let chunker = ChapterChunker::new(ChunkConfig {
            words_per_chunk: 20,
            ..small_config(ChunkMode::Chapter)
        });
        let input = pages(&[
            "Вступительный текст без заголовка будет отброшен.\n\
             Глава 1. Питание\n\
             Подключите блок питания к разъёму DC-IN.",
            "Глава 2. Сеть\n\
             Настройка VLAN выполняется командой vlan database.",
        ]);

        let chunks = chunker.chunk(&input);

        assert!(!chunks.iter().any(|c| c.contains("Вступительный")));
        // 장이 섞이지 않음
        assert!(chunks.iter().any(|c| c.contains("DC-IN")));
        assert!(chunks.iter().any(|c| c.contains("VLAN")));
        assert!(!chunks.iter().any(|c| c.contains("DC-IN") && c.contains("VLAN")));
        assert!(chunks[0].starts_with("Глава 1. Питание"));
    }

    #[test]
    fn test_chapter_without_headings_is_empty() {
        let chunker = ChapterChunker::new(ChunkConfig::chapters());
        let chunks = chunker.chunk(&pages(&[
            "Подключите блок питания к разъёму DC-IN.\nЗатем включите устройство.",
        ]));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_build_chunker_by_mode() {
        assert_eq!(build_chunker(&ChunkConfig::default()).name(), "FlatChunker");
        assert_eq!(build_chunker(&ChunkConfig::chapters()).name(), "ChapterChunker");
        assert_eq!(default_chunker().name(), "FlatChunker");
    }

    #[test]
    fn test_chunk_text() {
        let chunks = chunk_text("a b c d e f g h i j", 4, 1);
        assert_eq!(chunks, vec!["a b c d", "d e f g", "g h i j"]);
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let chunks = chunk_text("a b c d e f g h", 4, 0);
        assert_eq!(chunks, vec!["a b c d", "e f g h"]);
    }

    #[test]
    fn test_chunk_text_degenerate_overlap() {
        // overlap >= chunk_size 이어도 무한 루프 없음
        let chunks = chunk_text("a b c", 2, 5);
        assert_eq!(chunks, vec!["a b", "b c"]);
        assert!(chunk_text("", 4, 1).is_empty());
        assert!(chunk_text("a b", 0, 0).is_empty());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  A \t lot\nof   space "), "A lot of space");
    }
}
