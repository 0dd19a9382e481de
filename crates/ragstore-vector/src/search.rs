use tracing::debug;

use ragstore_core::error::{Error, Result};
use ragstore_core::types::{Meta, ScoreMode};
use ragstore_embed::BatchEmbedder;

use crate::index::Neighbor;
use crate::store::VectorStore;

/// A ranked hit joined with its stored text and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<'a> {
    pub offset: usize,
    pub text: &'a str,
    pub meta: &'a Meta,
    pub score: f32,
    /// Topology-native distance the score was derived from.
    pub distance: f32,
}

/// Query side of a [`VectorStore`].
///
/// Queries are embedded with the same [`BatchEmbedder`] abstraction used for
/// ingestion; pairing a store with a different model is allowed but only
/// warned about.
pub struct RetrievalEngine<'a> {
    store: &'a VectorStore,
    embedder: &'a BatchEmbedder,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(store: &'a VectorStore, embedder: &'a BatchEmbedder) -> Self {
        store.check_embedder(embedder.embedder_id());
        Self { store, embedder }
    }

    /// Up to `k` results scoring at least `min_score`, best first.
    ///
    /// `score_mode` must suit the topology: the conversions assume smaller
    /// distances are better, which does not hold for `flatip`.
    pub fn search(&self, query: &str, k: usize, score_mode: ScoreMode, min_score: f32) -> Result<Vec<SearchResult<'a>>> {
        let vector = self.embedder.embed_one(query)?;
        self.search_vector(&vector, k, score_mode, min_score)
    }

    pub fn search_vector(&self, query: &[f32], k: usize, score_mode: ScoreMode, min_score: f32) -> Result<Vec<SearchResult<'a>>> {
        let hits = self.store.search_vector(query, k)?;
        let found = hits.len();
        let results = self.join(hits, score_mode, min_score)?;
        debug!(k, found, kept = results.len(), "search");
        Ok(results)
    }

    /// One result list per query; queries are embedded in bounded batches.
    pub fn search_batch(
        &self,
        queries: &[String],
        k: usize,
        score_mode: ScoreMode,
        min_score: f32,
    ) -> Result<Vec<Vec<SearchResult<'a>>>> {
        let vectors = self.embedder.embed_all(queries)?;
        vectors.iter().map(|v| self.search_vector(v, k, score_mode, min_score)).collect()
    }

    fn join(&self, hits: Vec<Neighbor>, score_mode: ScoreMode, min_score: f32) -> Result<Vec<SearchResult<'a>>> {
        let store: &'a VectorStore = self.store;
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = score_mode.score(hit.distance);
            if score < min_score {
                continue;
            }
            let record = store
                .get(hit.offset)
                .ok_or_else(|| Error::CorruptState(format!("no metadata for vector {}", hit.offset)))?;
            out.push(SearchResult { offset: hit.offset, text: &record.text, meta: &record.meta, score, distance: hit.distance });
        }
        Ok(out)
    }
}
