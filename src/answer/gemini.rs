//! Gemini 기반 번역기/생성기
//!
//! generateContent API에 텍스트 프롬프트 하나를 보내고 첫 후보의 텍스트를 사용합니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::GeminiClient;

use super::{Generator, Translator};

/// Gemini 텍스트 생성 API 엔드포인트
const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// 번역은 결정적으로
const TRANSLATE_TEMPERATURE: f32 = 0.0;
const GENERATE_TEMPERATURE: f32 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 2048;

// ============================================================================
// GeminiTranslator
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    client: GeminiClient,
}

impl GeminiTranslator {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let prompt = format!(
            "Translate the following text from language '{}' to language '{}'. \
             Keep model names, commands and numbers unchanged. \
             Reply with the translation only.\n\n{}",
            source, target, text
        );
        generate_text(&self.client, &prompt, TRANSLATE_TEMPERATURE).await
    }
}

// ============================================================================
// GeminiGenerator
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: GeminiClient,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        generate_text(&self.client, prompt, GENERATE_TEMPERATURE).await
    }
}

/// 프롬프트 → 첫 후보 텍스트
async fn generate_text(client: &GeminiClient, prompt: &str, temperature: f32) -> Result<String> {
    let request = GenerateRequest {
        contents: vec![GenerateContent {
            parts: vec![TextPart {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    };

    let response: GenerateResponse = client.post(GEMINI_GENERATE_URL, &request).await?;

    let text = response.first_text();
    if text.trim().is_empty() {
        anyhow::bail!("Gemini returned no text");
    }
    Ok(text.trim().to_string())
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: GenerateContent,
}

impl GenerateResponse {
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![TextPart {
                    text: "Привет".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 16,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Привет");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 16);
    }

    #[test]
    fn test_first_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Подключите "},{"text":"DC-IN."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_text(), "Подключите DC-IN.");

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.first_text(), "");
    }
}
