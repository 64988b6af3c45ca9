//! 답변 구성 모듈
//!
//! 검색된 청크(raw context)를 운영자에게 보여줄 답변으로 바꿉니다.
//!
//! 1. 라틴 문자 비율이 높으면 번역 (`Translator`)
//! 2. 선택적으로 질문 + 맥락으로 답변 생성 (`Generator`)
//! 3. 문장 경계 줄바꿈 (reflow)
//!
//! 번역/생성 실패는 에러가 아니라 원문 + 표시(marker)로 처리합니다.

mod gemini;

pub use gemini::{GeminiGenerator, GeminiTranslator};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::{has_api_key, GeminiClient};

/// 번역 실패 표시
pub const TRANSLATION_FAILED: &str = "[Ошибка перевода]";
/// 생성 실패 표시
pub const GENERATION_FAILED: &str = "[Ошибка генерации]";

// ============================================================================
// Config
// ============================================================================

/// 답변 후처리 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// ". " → ".\n\n" 줄바꿈 (답변과 원문 모두)
    pub reflow: bool,
    /// 번역기가 있으면 외국어 맥락을 번역
    pub translate: bool,
    pub source_lang: String,
    pub target_lang: String,
    /// 이 비율을 넘으면 외국어로 판단
    pub latin_threshold: f32,
    /// 생성기로 답변 합성 (기본: 꺼짐, 청크 원문 그대로 사용)
    pub generate: bool,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            reflow: true,
            translate: true,
            source_lang: "en".to_string(),
            target_lang: "ru".to_string(),
            latin_threshold: 0.3,
            generate: false,
        }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// 번역기
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// 답변 생성기
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 구성된 답변
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedAnswer {
    /// 운영자에게 보여줄 답변
    pub answer: String,
    /// 번역되지 않은 원문 맥락
    pub raw_context: String,
}

pub struct AnswerComposer {
    config: AnswerConfig,
    translator: Option<Box<dyn Translator>>,
    generator: Option<Box<dyn Generator>>,
}

impl AnswerComposer {
    /// 협력자 없이 생성 (원문 + reflow만)
    pub fn new(config: AnswerConfig) -> Self {
        Self {
            config,
            translator: None,
            generator: None,
        }
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Some(Box::new(translator));
        self
    }

    pub fn with_generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// 맥락으로 답변 구성 (실패해도 항상 답변을 반환)
    pub async fn compose(&self, question: &str, context: &str) -> ComposedAnswer {
        let mut text = context.to_string();
        let mut marker = None;

        if let Some(translator) = self.translator.as_ref().filter(|_| self.config.translate) {
            if is_mostly_latin(&text, self.config.latin_threshold) {
                match translator
                    .translate(&text, &self.config.source_lang, &self.config.target_lang)
                    .await
                {
                    Ok(translated) => text = translated,
                    Err(e) => {
                        tracing::warn!("Translation failed: {:#}", e);
                        marker = Some(TRANSLATION_FAILED);
                    }
                }
            }
        }

        if let Some(generator) = self.generator.as_ref().filter(|_| self.config.generate) {
            match generator.generate(&build_prompt(question, &text)).await {
                Ok(generated) if !generated.trim().is_empty() => text = generated,
                Ok(_) => {
                    tracing::warn!("Generator returned an empty answer");
                    marker = marker.or(Some(GENERATION_FAILED));
                }
                Err(e) => {
                    tracing::warn!("Generation failed: {:#}", e);
                    marker = marker.or(Some(GENERATION_FAILED));
                }
            }
        }

        let answer = match marker {
            Some(marker) => format!("{} {}", marker, text),
            None => text,
        };

        if self.config.reflow {
            ComposedAnswer {
                answer: reflow(&answer),
                raw_context: reflow(context),
            }
        } else {
            ComposedAnswer {
                answer: answer.trim().to_string(),
                raw_context: context.trim().to_string(),
            }
        }
    }
}

/// 설정에 맞춰 Gemini 협력자를 연결한 구성기 생성
///
/// API 키가 없으면 원문 + reflow만 수행합니다.
pub fn create_composer(config: &AnswerConfig) -> AnswerComposer {
    let mut composer = AnswerComposer::new(config.clone());

    if !(config.translate || config.generate) || !has_api_key() {
        return composer;
    }

    let client = match GeminiClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Answer collaborators disabled: {:#}", e);
            return composer;
        }
    };

    if config.translate {
        composer = composer.with_translator(GeminiTranslator::new(client.clone()));
    }
    if config.generate {
        composer = composer.with_generator(GeminiGenerator::new(client));
    }
    composer
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 라틴 문자 비율이 임계값을 넘는지
pub fn is_mostly_latin(text: &str, threshold: f32) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let total = text.chars().count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    latin as f32 / total as f32 > threshold
}

/// 문장 경계에 빈 줄 삽입
pub fn reflow(text: &str) -> String {
    text.replace(". ", ".\n\n").trim().to_string()
}

/// 생성기 프롬프트
fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Ты помощник инженера первой линии поддержки. Ответь на вопрос, \
         используя только фрагмент инструкции ниже. Если во фрагменте нет ответа, \
         так и скажи.\n\nФрагмент:\n{}\n\nВопрос: {}\n\nОтвет:",
        context, question
    )
}

// ============================================================================
// Tests
// ============================================================================
