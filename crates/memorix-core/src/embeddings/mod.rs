//! Embedding provider abstraction (§4.E). Grounded in the teacher's
//! `EmbeddingManager` (two-layer cache, `sha2`/`hex` content hashing, batch
//! computation, JSON on-disk cache with corruption fallback), generalized
//! from a single always-on candle backend to a provider trait with up to two
//! optional implementations.

mod cache;
#[cfg(feature = "onnx-embeddings")]
pub mod onnx;
#[cfg(feature = "portable-embeddings")]
pub mod portable;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

pub use cache::EmbeddingCache;

use crate::error::{MemorixError, MemorixResult};

/// Uniform interface over a local embedding backend. Implementations are
/// optional; at most one is active per process.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Try the native ONNX-based provider first; on failure, try the portable
/// provider; if both fail, stay null. Selection is deterministic and cached
/// for the lifetime of the process (the manager is constructed once at
/// startup and held by the engine).
pub async fn select_provider(model_dir: &std::path::Path) -> Option<Box<dyn EmbeddingProvider>> {
    #[cfg(feature = "onnx-embeddings")]
    {
        match onnx::OnnxProvider::load(model_dir).await {
            Ok(provider) => {
                info!(provider = provider.name(), "embedding provider selected");
                return Some(Box::new(provider));
            }
            Err(e) => warn!(error = %e, "onnx embedding provider unavailable, falling back"),
        }
    }
    #[cfg(feature = "portable-embeddings")]
    {
        match portable::PortableProvider::load(model_dir).await {
            Ok(provider) => {
                info!(provider = provider.name(), "embedding provider selected");
                return Some(Box::new(provider));
            }
            Err(e) => warn!(error = %e, "portable embedding provider unavailable"),
        }
    }
    let _ = model_dir;
    warn!("no embedding provider active; hybrid search degrades to lexical-only");
    None
}

/// Owns the active provider (if any) and the two-layer cache in front of it.
pub struct EmbeddingManager {
    provider: Option<Box<dyn EmbeddingProvider>>,
    cache: tokio::sync::RwLock<EmbeddingCache>,
    cache_path: PathBuf,
    batch_size: usize,
}

impl EmbeddingManager {
    pub fn new(
        provider: Option<Box<dyn EmbeddingProvider>>,
        cache_path: PathBuf,
        capacity: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            cache: tokio::sync::RwLock::new(EmbeddingCache::new(capacity)),
            cache_path,
            batch_size,
        }
    }

    pub fn is_active(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.provider.as_ref().map(|p| p.dimensions())
    }

    /// Load the on-disk cache at startup, discarding anything malformed or
    /// of the wrong dimensionality rather than failing (§6, §"Supplemented
    /// features").
    pub async fn load_cache(&self) {
        let dimensions = self.dimensions();
        let mut cache = self.cache.write().await;
        cache.load_from_disk(&self.cache_path, dimensions).await;
    }

    async fn save_cache_if_dirty(&self) {
        let cache = self.cache.read().await;
        if cache.dirty() {
            if let Err(e) = cache.save_to_disk(&self.cache_path).await {
                warn!(error = %e, "failed to persist embedding cache");
            }
        }
    }

    /// Returns `None` if no provider is active (§4.E: "returns null from
    /// every accessor").
    pub async fn embed(&self, text: &str) -> MemorixResult<Option<Vec<f32>>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        let key = cache::content_hash(text);
        if let Some(hit) = self.cache.read().await.get(&key) {
            return Ok(Some(hit));
        }
        let vector = provider
            .embed(text)
            .await
            .map_err(|e| MemorixError::Conflict(e.to_string()))?;
        check_dimensions(provider.as_ref(), &vector)?;
        self.cache.write().await.insert(key, vector.clone());
        self.save_cache_if_dirty().await;
        Ok(Some(vector))
    }

    /// Batch embed, splitting into cache hits and misses, computing misses
    /// in provider-native batches of `batch_size`, and preserving original
    /// order. Zero-length input returns an empty sequence without touching
    /// the provider (§8 boundary behavior).
    pub async fn embed_batch(&self, texts: &[String]) -> MemorixResult<Option<Vec<Vec<f32>>>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        if texts.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let keys: Vec<String> = texts.iter().map(|t| cache::content_hash(t)).collect();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut to_compute = Vec::new();

        {
            let cache = self.cache.read().await;
            for (idx, key) in keys.iter().enumerate() {
                if let Some(hit) = cache.get(key) {
                    results[idx] = Some(hit);
                } else {
                    to_compute.push(idx);
                }
            }
        }

        for chunk in to_compute.chunks(self.batch_size) {
            let batch_texts: Vec<String> = chunk.iter().map(|&idx| texts[idx].clone()).collect();
            let vectors = provider
                .embed_batch(&batch_texts)
                .await
                .map_err(|e| MemorixError::Conflict(e.to_string()))?;
            let mut cache = self.cache.write().await;
            for (&idx, vector) in chunk.iter().zip(vectors.into_iter()) {
                check_dimensions(provider.as_ref(), &vector)?;
                cache.insert(keys[idx].clone(), vector.clone());
                results[idx] = Some(vector);
            }
        }

        self.save_cache_if_dirty().await;
        Ok(Some(
            results.into_iter().map(|r| r.expect("every index filled")).collect(),
        ))
    }
}

fn check_dimensions(provider: &dyn EmbeddingProvider, vector: &[f32]) -> MemorixResult<()> {
    if vector.len() != provider.dimensions() {
        return Err(MemorixError::DimensionMismatch {
            provider: provider.name().to_string(),
            expected: provider.dimensions(),
            actual: vector.len(),
        });
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            self.dim
        }
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![text.len() as f32; self.dim])
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn embed_returns_none_when_no_provider_is_active() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = EmbeddingManager::new(None, dir.path().join("cache.json"), 10, 4);
        assert_eq!(manager.embed("hello").await.unwrap(), None);
    }

    #[tokio::test]
    async fn embed_batch_empty_input_never_touches_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = EmbeddingManager::new(
            Some(Box::new(StubProvider { dim: 3 })),
            dir.path().join("cache.json"),
            10,
            4,
        );
        let result = manager.embed_batch(&[]).await.unwrap();
        assert_eq!(result, Some(Vec::new()));
    }

    #[tokio::test]
    async fn embed_caches_repeated_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = EmbeddingManager::new(
            Some(Box::new(StubProvider { dim: 3 })),
            dir.path().join("cache.json"),
            10,
            4,
        );
        let first = manager.embed("hello").await.unwrap();
        let second = manager.embed("hello").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
