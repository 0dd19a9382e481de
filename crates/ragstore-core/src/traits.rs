/// External embedding model, consumed as a black box.
///
/// Implementations must be deterministic for a fixed model and return vectors
/// of constant dimensionality. Batching and timeouts are applied by the caller
/// (see `ragstore_embed::BatchEmbedder`), so `embed_batch` may assume it is
/// handed a bounded slice.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d384`).
    fn embedder_id(&self) -> &str;
    /// Compute embeddings for a batch of input texts, one vector per text.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
