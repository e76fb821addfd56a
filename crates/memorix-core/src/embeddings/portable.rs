//! Pure-Rust (candle) embedding provider: a thin `EmbeddingProvider` adapter
//! over the teacher's `semantic-embeddings` crate, kept almost unchanged
//! since it was already a general-purpose text-embedding library rather
//! than anything Obsidian-vault-specific. Labeled "portable" because it
//! carries no native `onnxruntime` shared-library dependency, unlike
//! [`super::onnx::OnnxProvider`].

use std::path::Path;

use async_trait::async_trait;
use semantic_embeddings::SemanticEmbeddings;

use super::EmbeddingProvider;

pub struct PortableProvider {
    inner: SemanticEmbeddings,
}

impl PortableProvider {
    pub async fn load(model_dir: &Path) -> anyhow::Result<Self> {
        if !model_dir.join("model.safetensors").is_file() {
            anyhow::bail!("portable model files not found under {}", model_dir.display());
        }
        let inner = SemanticEmbeddings::new();
        let dir = model_dir.to_path_buf();
        let provider = tokio::task::spawn_blocking(move || inner_load(inner, &dir))
            .await
            .map_err(|e| anyhow::anyhow!("model load task panicked: {e}"))??;
        Ok(provider)
    }
}

fn inner_load(inner: SemanticEmbeddings, dir: &Path) -> anyhow::Result<PortableProvider> {
    inner.load_model_from_dir(dir)?;
    Ok(PortableProvider { inner })
}

#[async_trait]
impl EmbeddingProvider for PortableProvider {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn dimensions(&self) -> usize {
        semantic_embeddings::EMBEDDING_DIM
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.inner.encode(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.inner.encode_batch(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_fails_gracefully_when_model_files_are_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = PortableProvider::load(dir.path()).await;
        assert!(result.is_err());
    }
}
