//! Two-layer embedding cache (§4.E, §3 EmbeddingCache). Grounded in the
//! teacher's `EmbeddingManager`: `sha2`/`hex` content hashing, an in-memory
//! map checked before the on-disk one, and a `load_cache` that discards the
//! file and continues rather than failing startup when it can't be parsed.

use std::collections::VecDeque;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::MemorixResult;

/// `sha256(text)[0..16 hex chars]`, per §3's EmbeddingCache key format.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// In-memory FIFO-capped map plus the on-disk mirror it's backed by.
pub struct EmbeddingCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, Vec<f32>>,
    dirty: bool,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, vector: Vec<f32>) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, vector);
            self.dirty = true;
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, vector);
        self.dirty = true;
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load `[hash, vector]` pairs from disk. A missing file is empty; a
    /// file that fails to parse, or whose vectors disagree with the active
    /// provider's dimensionality, is discarded entry-by-entry (or wholesale
    /// on parse failure) with a warning rather than failing startup.
    pub async fn load_from_disk(&mut self, path: &Path, dimensions: Option<usize>) {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not read embedding cache");
                return;
            }
        };
        let pairs: Vec<(String, Vec<f32>)> = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "embedding cache malformed, discarding");
                return;
            }
        };
        for (hash, vector) in pairs {
            if let Some(dim) = dimensions {
                if vector.len() != dim {
                    continue;
                }
            }
            if self.order.len() >= self.capacity {
                break;
            }
            self.order.push_back(hash.clone());
            self.entries.insert(hash, vector);
        }
        self.dirty = false;
    }

    pub async fn save_to_disk(&self, path: &Path) -> MemorixResult<()> {
        let pairs: Vec<(&String, &Vec<f32>)> = self
            .order
            .iter()
            .filter_map(|key| self.entries.get_key_value(key))
            .collect();
        crate::persistence::save_json(path, &pairs).await
    }
}
