//! Native ONNX Runtime-backed embedding provider. `ort` is the same crate a
//! sibling memory-system project uses for exactly this role (see
//! `examples/other_examples/manifests/limaronaldo-engram/Cargo.toml`'s
//! `onnx-embed` feature), since the teacher itself has no ONNX backend. The
//! model-directory-with-tokenizer loading convention (`config.json`,
//! `tokenizer.json`, weights file) mirrors the teacher's
//! `SemanticEmbeddings::load_model_from_dir`.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::EmbeddingProvider;

pub const DIMENSIONS: usize = 384;

pub struct OnnxProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxProvider {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`. Absence of
    /// either file, or a session that fails to build, is a recoverable
    /// "provider unavailable" condition — not a panic — so
    /// `select_provider` can fall through to the portable backend.
    pub async fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !model_path.is_file() || !tokenizer_path.is_file() {
            anyhow::bail!("onnx model files not found under {}", model_dir.display());
        }

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        let session = Session::builder()?.commit_from_file(&model_path)?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn run(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch = encodings.len();
        let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

        let mut ids = vec![0i64; batch * max_len];
        let mut mask = vec![0i64; batch * max_len];
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, &id) in encoding.get_ids().iter().enumerate() {
                ids[row * max_len + col] = id as i64;
                mask[row * max_len + col] = 1;
            }
        }

        let mut session = self.session.lock().expect("onnx session mutex poisoned");
        let input_ids = Tensor::from_array(([batch, max_len], ids.into_boxed_slice()))?;
        let attention_mask = Tensor::from_array(([batch, max_len], mask.into_boxed_slice()))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        ])?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let hidden = shape[shape.len() - 1] as usize;
        let mut vectors = Vec::with_capacity(batch);
        for row in 0..batch {
            vectors.push(data[row * hidden..(row + 1) * hidden].to_vec());
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxProvider {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let vectors = self.run(std::slice::from_ref(&text.to_string()))?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("onnx provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.run(texts)
    }
}
