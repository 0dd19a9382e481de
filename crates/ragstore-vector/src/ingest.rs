use std::collections::HashSet;
use tracing::debug;

use ragstore_core::types::Chunk;

use crate::fingerprint::{Fingerprint, FingerprintSet};

/// Chunks that survived deduplication, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestBatch {
    pub chunks: Vec<Chunk>,
    /// `fingerprints[i]` belongs to `chunks[i]`.
    pub fingerprints: Vec<Fingerprint>,
    /// Position of each accepted chunk in the submitted sequence.
    pub positions: Vec<usize>,
    pub duplicates: usize,
}

impl IngestBatch {
    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn texts(&self) -> Vec<String> { self.chunks.iter().map(|c| c.text.clone()).collect() }
}

/// Exact-duplicate filter in front of the index.
///
/// Duplicates are skipped per chunk: one repeated chunk never drops its
/// neighbors from the same document. Within a batch the first occurrence of a
/// text wins.
#[derive(Debug, Clone, Default)]
pub struct ChunkIngestor {
    seen: FingerprintSet,
}

impl ChunkIngestor {
    pub fn new() -> Self { Self::default() }

    pub fn with_fingerprints(seen: FingerprintSet) -> Self { Self { seen } }

    pub fn fingerprints(&self) -> &FingerprintSet { &self.seen }

    pub fn into_fingerprints(self) -> FingerprintSet { self.seen }

    /// Split `chunks` into new ones and a duplicate count without recording
    /// anything. Pair with [`commit`](Self::commit) once the batch is stored.
    pub fn stage(&self, chunks: Vec<Chunk>) -> IngestBatch {
        let mut batch = IngestBatch::default();
        let mut pending: HashSet<Fingerprint> = HashSet::new();
        for (position, chunk) in chunks.into_iter().enumerate() {
            let fp = Fingerprint::of(&chunk.text);
            if self.seen.contains(&fp) || !pending.insert(fp) {
                batch.duplicates += 1;
                continue;
            }
            batch.fingerprints.push(fp);
            batch.positions.push(position);
            batch.chunks.push(chunk);
        }
        debug!(accepted = batch.len(), duplicates = batch.duplicates, "staged chunks");
        batch
    }

    pub fn commit(&mut self, fingerprints: &[Fingerprint]) { self.seen.extend(fingerprints.iter().copied()); }

    /// Stage and commit in one step.
    pub fn ingest(&mut self, chunks: Vec<Chunk>) -> IngestBatch {
        let batch = self.stage(chunks);
        self.commit(&batch.fingerprints);
        batch
    }
}
