//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 모든 프로바이더는 단위 길이(L2 norm = 1)로 정규화된 벡터를 반환합니다.
//! 따라서 내적 = 코사인 유사도입니다.
//!
//! - `GeminiEmbedding`: Gemini API (gemini-embedding-001)
//! - `HashingEmbedding`: 문자 3-gram 해싱 (오프라인, 결정적)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder()?;
//! let vectors = embedder.embed_batch(&chunks).await?;
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::{has_api_key, GeminiClient};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 반환 벡터는 반드시 정규화되어 있어야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// L2 정규화 (영벡터는 그대로)
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Google Gemini 임베딩 구현체
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    dimension: usize,
}

impl GeminiEmbedding {
    /// 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn with_client(client: GeminiClient, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }
        Ok(Self { client, dimension })
    }

    /// 환경변수의 API 키로 기본 차원 생성
    pub fn from_env() -> Result<Self> {
        Self::with_client(GeminiClient::from_env()?, DEFAULT_DIMENSION)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: "SEMANTIC_SIMILARITY",
            output_dimensionality: self.dimension,
        };

        let response: EmbedResponse = self.client.post(GEMINI_EMBED_URL, &request).await?;
        let values = response.embedding.values;

        if values.len() != self.dimension {
            anyhow::bail!(
                "Gemini returned {} dimensions, expected {}",
                values.len(),
                self.dimension
            );
        }

        // 768/1536 차원은 API가 정규화하지 않음
        Ok(normalize(values))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Gemini는 배치 API가 없으므로 순차 처리
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Hashing Embedding
// ============================================================================

/// 해싱 임베딩 기본 차원
pub const HASHING_DIMENSION: usize = 512;

/// 문자 3-gram 해싱 임베딩
///
/// 소문자 변환 후 문자 3-gram을 FNV-1a 해시로 버킷에 누적합니다.
/// 의미 검색 품질은 낮지만 네트워크 없이 결정적으로 동작합니다.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 0xcbf29ce484222325u64;
            for c in window {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(0x100000001b3);
                }
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }

        normalize(vector)
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-trigram"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
///
/// API 키가 있으면 Gemini, 없으면 해싱 임베딩을 사용합니다.
pub fn create_embedder() -> Result<Box<dyn EmbeddingProvider>> {
    if has_api_key() {
        let embedder = GeminiEmbedding::from_env()?;
        tracing::info!(
            "Using Gemini API embedding (dimension: {})",
            embedder.dimension()
        );
        return Ok(Box::new(embedder));
    }

    tracing::info!(
        "No API key, using offline hashing embedding (dimension: {})",
        HASHING_DIMENSION
    );
    Ok(Box::new(HashingEmbedding::default()))
}

// ============================================================================
// Tests
// ============================================================================
