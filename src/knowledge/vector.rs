//! Vector Index - 정확한 내적 기반 벡터 검색
//!
//! 근사(ANN) 구조 없이 모든 벡터와 내적을 계산합니다. 운영자가 올린 매뉴얼
//! 수천 청크 규모에서는 충분히 빠르고, 순위가 항상 재현됩니다.
//!
//! 저장 파일 (한 쌍):
//! - `index.bin`: 벡터 blob (magic, version, dimension, count, 임베더 이름, f32 LE)
//! - `chunks.json`: 청크 텍스트 목록 (i번째 = i번째 벡터)

use std::path::Path;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::persist::{read_json, write_atomic, write_json_atomic};

/// 벡터 blob 파일 이름
pub const INDEX_FILE: &str = "index.bin";
/// 청크 텍스트 파일 이름
pub const CHUNKS_FILE: &str = "chunks.json";

const MAGIC: &[u8; 4] = b"HRIX";
const FORMAT_VERSION: u32 = 2;
/// magic(4) + version(4) + dimension(4) + count(8) + name_len(4)
const HEADER_LEN: usize = 24;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 인덱스 내 위치 (= 벡터 ID)
    pub position: usize,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 내적 (정규화 벡터이므로 코사인 유사도)
    pub similarity: f32,
}

// ============================================================================
// FlatIndex
// ============================================================================

/// 평면 내적 인덱스
///
/// 벡터와 청크 텍스트는 항상 같은 개수로 함께 추가됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    /// 벡터를 만든 임베딩 프로바이더 이름
    embedder: String,
    dimension: usize,
    vectors: Vec<f32>,
    chunks: Vec<String>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self::for_embedder("", dimension)
    }

    pub fn for_embedder(embedder: &str, dimension: usize) -> Self {
        Self {
            embedder: embedder.to_string(),
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 같은 임베딩 공간의 벡터인지 (이름과 차원이 모두 같아야 함)
    pub fn is_compatible(&self, embedder: &str, dimension: usize) -> bool {
        self.embedder == embedder && self.dimension == dimension
    }

    /// 사람이 읽는 임베딩 공간 표기
    pub fn label(&self) -> String {
        embedding_label(&self.embedder, self.dimension)
    }

    /// 저장된 벡터 개수
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn chunk(&self, position: usize) -> Option<&str> {
        self.chunks.get(position).map(String::as_str)
    }

    fn vector(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// 청크와 임베딩을 함께 추가
    ///
    /// 개수나 차원이 맞지 않으면 아무것도 추가하지 않고 에러를 반환합니다.
    pub fn insert(&mut self, chunks: Vec<String>, embeddings: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::Embedding(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let added = chunks.len();
        self.vectors.reserve(added * self.dimension);
        for embedding in embeddings {
            self.vectors.extend_from_slice(&embedding);
        }
        self.chunks.extend(chunks);

        Ok(added)
    }

    /// 앞에서부터 `len`개만 남김 (저장 실패 시 되돌리기용)
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        self.vectors.truncate(len * self.dimension);
        self.chunks.truncate(len);
    }

    /// 최소 길이 필터 → 임베딩 → 추가
    ///
    /// 필터 후 남은 청크가 없으면 아무 일도 하지 않습니다.
    pub async fn add(
        &mut self,
        embedder: &dyn EmbeddingProvider,
        chunks: Vec<String>,
        min_chars: usize,
    ) -> Result<usize> {
        let chunks = filter_short(chunks, min_chars);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = embedder
            .embed_batch(&chunks)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        self.insert(chunks, embeddings)
    }

    /// 쿼리 벡터로 상위 k개 검색 (유사도 내림차순)
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        if self.is_empty() || k == 0 || query.len() != self.dimension {
            return vec![];
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, dot(self.vector(i), query)))
            .collect();

        // 동점이면 먼저 추가된 청크 우선
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, similarity)| SearchResult {
                position,
                chunk_text: self.chunks[position].clone(),
                similarity,
            })
            .collect()
    }

    /// 쿼리 텍스트로 상위 k개 검색
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if self.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        if query_embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        Ok(self.search_vector(&query_embedding, k))
    }

    /// 디렉토리에 저장 (청크 텍스트 → 벡터 blob 순서)
    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json_atomic(&dir.join(CHUNKS_FILE), &self.chunks)?;
        write_atomic(&dir.join(INDEX_FILE), &self.encode())?;

        tracing::debug!("Saved index with {} vectors to {:?}", self.len(), dir);
        Ok(())
    }

    /// 디렉토리에서 로드
    ///
    /// 두 파일 중 하나라도 없으면 `NotFound`, 개수가 다르면 `Corrupt`.
    pub fn load(dir: &Path) -> Result<Self> {
        let index_path = dir.join(INDEX_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        for path in [&index_path, &chunks_path] {
            if !path.exists() {
                return Err(RagError::NotFound(path.clone()));
            }
        }

        let bytes = std::fs::read(&index_path)?;
        let (embedder, dimension, vectors) = decode(&bytes).map_err(|details| RagError::Corrupt {
            path: index_path.clone(),
            details,
        })?;

        let chunks: Vec<String> = read_json(&chunks_path)?;

        let count = if dimension == 0 { 0 } else { vectors.len() / dimension };
        if chunks.len() != count {
            return Err(RagError::Corrupt {
                path: chunks_path,
                details: format!("{} chunks for {} vectors", chunks.len(), count),
            });
        }

        tracing::info!(
            "Loaded index with {} vectors ({})",
            count,
            embedding_label(&embedder, dimension)
        );
        Ok(Self {
            embedder,
            dimension,
            vectors,
            chunks,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let name = self.embedder.as_bytes();
        let mut bytes = Vec::with_capacity(HEADER_LEN + name.len() + self.vectors.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(name);
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

/// blob 디코딩 → (임베더 이름, 차원, 평탄화된 벡터)
fn decode(bytes: &[u8]) -> std::result::Result<(String, usize, Vec<f32>), String> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err("not an index file".to_string());
    }

    let read_u32 = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    let version = read_u32(4);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", version));
    }

    let dimension = read_u32(8) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let name_len = read_u32(20) as usize;
    let name = bytes
        .get(HEADER_LEN..HEADER_LEN + name_len)
        .ok_or_else(|| "truncated embedder name".to_string())?;
    let embedder = String::from_utf8(name.to_vec())
        .map_err(|_| "embedder name is not valid UTF-8".to_string())?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "vector payload size overflow".to_string())?;
    let payload = &bytes[HEADER_LEN + name_len..];
    if payload.len() != expected {
        return Err(format!(
            "expected {} payload bytes, found {}",
            expected,
            payload.len()
        ));
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((embedder, dimension, vectors))
}

/// "이름 (N dims)" 형식
pub fn embedding_label(embedder: &str, dimension: usize) -> String {
    format!("{} ({} dims)", embedder, dimension)
}

/// 최소 길이 미만 청크 제거 (문자 수 기준)
pub fn filter_short(chunks: Vec<String>, min_chars: usize) -> Vec<String> {
    chunks
        .into_iter()
        .filter(|c| c.trim().chars().count() >= min_chars)
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산 (-1.0 ~ 1.0)
///
/// 정규화되지 않은 벡터 비교용입니다. 인덱스 내부는 내적을 씁니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use tempfile::TempDir;

    fn unit(values: &[f32]) -> Vec<f32> {
        crate::embedding::normalize(values.to_vec())
    }

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index
            .insert(
                vec!["x".into(), "y".into(), "xy".into()],
                vec![unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0]), unit(&[1.0, 1.0, 0.0])],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = sample_index();
        let results = index.search_vector(&unit(&[1.0, 0.1, 0.0]), 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_text, "x");
        assert_eq!(results[1].chunk_text, "xy");
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[test]
    fn test_search_empty_and_k_larger_than_len() {
        assert!(FlatIndex::new(3).search_vector(&[1.0, 0.0, 0.0], 5).is_empty());

        let index = sample_index();
        assert_eq!(index.search_vector(&unit(&[0.0, 0.0, 1.0]), 10).len(), 3);
        assert!(index.search_vector(&unit(&[1.0, 0.0, 0.0]), 0).is_empty());
    }

    #[test]
    fn test_insert_rejects_mismatch_without_mutation() {
        let mut index = sample_index();

        let err = index.insert(vec!["a".into()], vec![vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));

        assert!(index.insert(vec!["a".into(), "b".into()], vec![vec![1.0, 0.0, 0.0]]).is_err());
        assert_eq!(index.len(), 3);
        assert_eq!(index.vectors.len(), 9);
    }

    #[test]
    fn test_truncate_keeps_alignment() {
        let mut index = sample_index();
        index.truncate(1);

        assert_eq!(index.chunks(), ["x"]);
        assert_eq!(index.vectors.len(), 3);

        index.truncate(5);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_add_filters_short_chunks_and_stays_aligned() {
        let embedder = HashingEmbedding::new(64);
        let mut index = FlatIndex::new(64);

        let added = index
            .add(
                &embedder,
                vec![
                    "Тестовый фрагмент 1 с достаточной длиной для прохождения фильтрации.".into(),
                    "коротко".into(),
                    "Тестовый фрагмент 2 также содержит больше тридцати символов.".into(),
                ],
                30,
            )
            .await
            .unwrap();
        assert_eq!(added, 2);

        let added = index.add(&embedder, vec!["мало".into()], 30).await.unwrap();
        assert_eq!(added, 0);

        assert_eq!(index.len(), 2);
        assert_eq!(index.vectors.len(), index.len() * index.dimension());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let embedder = HashingEmbedding::new(64);
        let mut index = FlatIndex::new(64);
        index
            .add(
                &embedder,
                vec![
                    "Инструкция по подключению питания: используйте разъём DC-IN.".into(),
                    "Настройка VLAN: введите команду vlan database.".into(),
                ],
                30,
            )
            .await
            .unwrap();
        index.save(dir.path()).unwrap();

        let loaded = FlatIndex::load(dir.path()).unwrap();
        assert_eq!(loaded, index);

        let before = index.search(&embedder, "Как подключить питание?", 2).await.unwrap();
        let after = loaded.search(&embedder, "Как подключить питание?", 2).await.unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_embedder_identity_survives_save() {
        let dir = TempDir::new().unwrap();
        let mut index = FlatIndex::for_embedder("hashing-trigram", 3);
        index
            .insert(vec!["x".into()], vec![unit(&[1.0, 0.0, 0.0])])
            .unwrap();
        index.save(dir.path()).unwrap();

        let loaded = FlatIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.embedder(), "hashing-trigram");
        assert!(loaded.is_compatible("hashing-trigram", 3));
        assert!(!loaded.is_compatible("hashing-trigram", 4));
        assert!(!loaded.is_compatible("gemini-embedding-001", 3));
        assert_eq!(loaded.label(), "hashing-trigram (3 dims)");
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(FlatIndex::load(dir.path()).unwrap_err().is_not_found());

        // 벡터 blob만 있고 청크 목록이 없음
        sample_index().save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(CHUNKS_FILE)).unwrap();
        assert!(FlatIndex::load(dir.path()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_load_detects_misaligned_files() {
        let dir = TempDir::new().unwrap();
        sample_index().save(dir.path()).unwrap();
        std::fs::write(dir.path().join(CHUNKS_FILE), r#"["x", "y"]"#).unwrap();

        assert!(matches!(
            FlatIndex::load(dir.path()),
            Err(RagError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_detects_truncated_blob() {
        let dir = TempDir::new().unwrap();
        sample_index().save(dir.path()).unwrap();

        let path = dir.path().join(INDEX_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(
            FlatIndex::load(dir.path()),
            Err(RagError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
