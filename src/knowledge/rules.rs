//! 줄 분류 규칙 테이블
//!
//! PDF에서 추출한 한 줄이 노이즈(쪽 번호, URL, 전화번호, 저작권 문구)인지,
//! 장(chapter) 제목인지 판별합니다.
//!
//! 규칙은 이름 붙은 술어(predicate)의 순서 있는 목록입니다. 새 규칙은 목록에
//! 추가만 하면 되고, 어느 규칙이 걸렸는지 `matching_rule`로 확인할 수 있습니다.
//! 모든 분류는 순수 함수이며 입력 순서와 무관합니다.

use std::sync::LazyLock;

use regex::Regex;

/// 노이즈가 아닌 줄의 최소 길이 (문자 수)
pub const DEFAULT_MIN_LINE_CHARS: usize = 10;

/// 제목으로 인정하는 최대 길이 (문자 수)
pub const MAX_HEADING_CHARS: usize = 120;

/// 기본 보일러플레이트 문구 (대소문자 무시)
pub const DEFAULT_BOILERPLATE: &[&str] = &[
    "©",
    "copyright",
    "all rights reserved",
    "все права защищены",
    "confidential",
    "конфиденциально",
    "document id",
    "документ id",
    "printed in",
    "отпечатано в",
];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.").expect("valid url regex"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").expect("valid email regex"));

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d{1,3}[\s\-]?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}")
        .expect("valid phone regex")
});

static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{7,}").expect("valid digit run regex"));

static PAGE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:page|стр\.?|страница)\s*\d+(?:\s*(?:of|из|/)\s*\d+)?$")
        .expect("valid page number regex")
});

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\s.,\-/]+$").expect("valid numeric regex"));

static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)+\.?\s+\p{L}").expect("valid heading regex"));

static LABELED_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:глава|chapter|раздел|section|часть|part)\s+(?:\d+|[ivxlcdm]+)\b")
        .expect("valid heading regex")
});

/// 올바른 로마 숫자 (1..3999)
static ROMAN_NUMERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^M{0,3}(?:CM|CD|D?C{0,3})(?:XC|XL|L?X{0,3})(?:IX|IV|V?I{0,3})$")
        .expect("valid roman numeral regex")
});

/// 마침표 없이 쓰는 작은 로마 숫자 (1..39). "DC", "CD" 같은 약어와 구분
static SMALL_ROMAN_NUMERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^X{0,3}(?:IX|IV|V?I{0,3})$").expect("valid roman numeral regex")
});

static DEFAULT_JUNK: LazyLock<JunkClassifier> = LazyLock::new(JunkClassifier::default);
static DEFAULT_HEADINGS: LazyLock<HeadingClassifier> = LazyLock::new(HeadingClassifier::default);

// ============================================================================
// LineRule
// ============================================================================

/// 이름 붙은 줄 술어
pub struct LineRule {
    pub name: &'static str,
    check: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl LineRule {
    pub fn new(name: &'static str, check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name,
            check: Box::new(check),
        }
    }

    /// 정규식 하나로 된 규칙
    pub fn regex(name: &'static str, re: &'static Regex) -> Self {
        Self::new(name, move |line| re.is_match(line))
    }

    pub fn matches(&self, line: &str) -> bool {
        (self.check)(line)
    }
}

impl std::fmt::Debug for LineRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineRule").field("name", &self.name).finish()
    }
}

// ============================================================================
// JunkClassifier
// ============================================================================

/// 노이즈 줄 분류기
///
/// 규칙 중 하나라도 걸리면 노이즈입니다.
#[derive(Debug)]
pub struct JunkClassifier {
    rules: Vec<LineRule>,
}

impl JunkClassifier {
    /// 최소 줄 길이와 보일러플레이트 문구로 생성
    pub fn new(min_line_chars: usize, boilerplate: &[String]) -> Self {
        let phrases: Vec<String> = boilerplate
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let rules = vec![
            LineRule::new("empty", |line| line.is_empty()),
            LineRule::regex("numeric", &NUMERIC_RE),
            LineRule::regex("page_number", &PAGE_NUMBER_RE),
            LineRule::regex("url", &URL_RE),
            LineRule::regex("email", &EMAIL_RE),
            LineRule::regex("phone", &PHONE_RE),
            LineRule::regex("digit_run", &DIGIT_RUN_RE),
            LineRule::new("boilerplate", move |line| {
                let lowered = line.to_lowercase();
                phrases.iter().any(|p| lowered.contains(p.as_str()))
            }),
            LineRule::new("too_short", move |line| {
                line.chars().count() < min_line_chars
            }),
        ];

        Self { rules }
    }

    /// 규칙 추가 (기존 규칙 뒤에)
    pub fn with_rule(mut self, rule: LineRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// 처음으로 걸린 규칙 이름
    pub fn matching_rule(&self, line: &str) -> Option<&'static str> {
        let line = line.trim();
        self.rules.iter().find(|r| r.matches(line)).map(|r| r.name)
    }

    pub fn is_junk(&self, line: &str) -> bool {
        self.matching_rule(line).is_some()
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

impl Default for JunkClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LINE_CHARS, &default_boilerplate())
    }
}

/// 기본 보일러플레이트 문구 목록 (설정 기본값용)
pub fn default_boilerplate() -> Vec<String> {
    DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// HeadingClassifier
// ============================================================================

/// 장 제목 분류기
///
/// - 번호형: "1.2 Установка", "3.1.5 Подключение питания"
/// - 라벨형: "Глава 1. Введение", "Chapter 2: Configuration", "Раздел 5 — ..."
/// - 로마 숫자형: "IV. Обслуживание", "IV Обслуживание"
///
/// 마침표로 끝나는 줄(문장)과 너무 긴 줄은 제목이 아닙니다.
#[derive(Debug)]
pub struct HeadingClassifier {
    rules: Vec<LineRule>,
}

impl HeadingClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                LineRule::regex("numbered", &NUMBERED_HEADING_RE),
                LineRule::regex("labeled", &LABELED_HEADING_RE),
                LineRule::new("roman", is_roman_heading),
            ],
        }
    }

    pub fn with_rule(mut self, rule: LineRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn matching_rule(&self, line: &str) -> Option<&'static str> {
        let line = line.trim();
        if line.is_empty() || line.ends_with('.') || line.chars().count() > MAX_HEADING_CHARS {
            return None;
        }
        self.rules.iter().find(|r| r.matches(line)).map(|r| r.name)
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.matching_rule(line).is_some()
    }
}

impl Default for HeadingClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// 로마 숫자 + 대문자로 시작하는 제목
///
/// "IV. Обслуживание"는 모든 숫자를, "IV Обслуживание"는 XXXIX까지만 허용합니다.
fn is_roman_heading(line: &str) -> bool {
    let Some((token, rest)) = line.split_once(char::is_whitespace) else {
        return false;
    };
    if !rest.trim_start().chars().next().is_some_and(char::is_uppercase) {
        return false;
    }

    match token.strip_suffix('.') {
        Some(numeral) => !numeral.is_empty() && ROMAN_NUMERAL_RE.is_match(numeral),
        None => !token.is_empty() && SMALL_ROMAN_NUMERAL_RE.is_match(token),
    }
}

// ============================================================================
// Shortcuts
// ============================================================================

/// 기본 규칙으로 노이즈 판별
pub fn is_junk_line(line: &str) -> bool {
    DEFAULT_JUNK.is_junk(line)
}

/// 기본 규칙으로 장 제목 판별
pub fn is_chapter_heading(line: &str) -> bool {
    DEFAULT_HEADINGS.is_heading(line)
}

// ============================================================================
// Tests
// ============================================================================
