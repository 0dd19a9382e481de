//! Embedding collaborators: provider selection, a deterministic hashing
//! embedder, and the bounded/timed batching every caller goes through.

use anyhow::{anyhow, Result};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;
use twox_hash::XxHash64;

use ragstore_core::config::EmbeddingConfig;
use ragstore_core::traits::Embedder;

mod batch;

pub use batch::BatchEmbedder;

/// Feature-hashing embedder: each whitespace token lands in a bucket chosen by
/// its xxhash, and the result is L2-normalized.
///
/// Deterministic and model-free, which makes it the default for development
/// and tests. Texts sharing tokens land close to each other.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 {
            return v;
        }
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Build the embedder named by `embedding.provider`.
///
/// Model-backed providers live outside this workspace and plug in through the
/// [`Embedder`] trait; the built-in choice is `hashing`.
pub fn embedder_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match cfg.provider.as_str() {
        "hashing" | "fake" => {
            info!(dim = cfg.dimension, "using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(cfg.dimension)))
        }
        other => Err(anyhow!("Unknown embedding provider '{}'", other)),
    }
}
