//! The `{index, metadata, fingerprints}` triple and the only code that mutates it.

use std::fmt;
use tracing::{info, warn};

use ragstore_core::config::IndexConfig;
use ragstore_core::error::{Error, Result};
use ragstore_core::types::{Chunk, Topology};
use ragstore_embed::BatchEmbedder;

use crate::fingerprint::{Fingerprint, FingerprintSet};
use crate::index::{IndexSpec, Neighbor, VectorIndex};
use crate::ingest::{ChunkIngestor, IngestBatch};
use crate::metadata::{MetadataStore, Record};

/// Outcome of one ingestion call. Duplicates are counted, not errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub submitted: usize,
    pub accepted: usize,
    pub duplicates: usize,
    /// Offset of the first accepted chunk, when any was accepted.
    pub first_offset: Option<usize>,
    /// The batch also trained an IVF index.
    pub trained: bool,
}

/// Read-only summary for `describe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub topology: Topology,
    pub dimension: Option<usize>,
    pub vectors: usize,
    pub records: usize,
    pub fingerprints: usize,
    pub trained: bool,
    pub n_list: Option<usize>,
    pub n_probe: Option<usize>,
    pub embedder_id: Option<String>,
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "topology:     {}", self.topology)?;
        match self.dimension {
            Some(d) => writeln!(f, "dimension:    {d}")?,
            None => writeln!(f, "dimension:    (not set)")?,
        }
        writeln!(f, "vectors:      {}", self.vectors)?;
        writeln!(f, "records:      {}", self.records)?;
        writeln!(f, "fingerprints: {}", self.fingerprints)?;
        writeln!(f, "trained:      {}", self.trained)?;
        if let (Some(n_list), Some(n_probe)) = (self.n_list, self.n_probe) {
            writeln!(f, "n_list:       {n_list}")?;
            writeln!(f, "n_probe:      {n_probe}")?;
        }
        write!(f, "embedder:     {}", self.embedder_id.as_deref().unwrap_or("(none)"))
    }
}

/// Append-only vector store.
///
/// The index is created lazily with the dimension of the first embedded batch.
/// Every mutating call either fully succeeds or leaves index, metadata and
/// fingerprints exactly as they were.
#[derive(Debug, Clone)]
pub struct VectorStore {
    spec: IndexSpec,
    auto_train: bool,
    index: Option<VectorIndex>,
    metadata: MetadataStore,
    ingestor: ChunkIngestor,
    embedder_id: Option<String>,
}

impl VectorStore {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            auto_train: true,
            index: None,
            metadata: MetadataStore::new(),
            ingestor: ChunkIngestor::new(),
            embedder_id: None,
        }
    }

    pub fn from_config(cfg: &IndexConfig) -> Self { Self::new(IndexSpec::from_config(cfg)).with_auto_train(cfg.auto_train) }

    /// Reassemble a store from loaded parts, enforcing the alignment invariant.
    pub fn from_parts(
        spec: IndexSpec,
        index: Option<VectorIndex>,
        metadata: MetadataStore,
        fingerprints: FingerprintSet,
        embedder_id: Option<String>,
    ) -> Result<Self> {
        let vectors = index.as_ref().map_or(0, VectorIndex::len);
        if vectors != metadata.len() {
            return Err(Error::CorruptState(format!(
                "index holds {vectors} vectors but metadata holds {} records",
                metadata.len()
            )));
        }
        let uncovered = metadata.iter().position(|r| !fingerprints.contains(&Fingerprint::of(&r.text)));
        if let Some(offset) = uncovered {
            return Err(Error::CorruptState(format!("record {offset} has no fingerprint in the saved set")));
        }
        let spec = match &index {
            Some(i) => i.ivf_spec().copied().unwrap_or_else(|| spec.with_topology(i.topology())),
            None => spec,
        };
        Ok(Self {
            spec,
            auto_train: true,
            index,
            metadata,
            ingestor: ChunkIngestor::with_fingerprints(fingerprints),
            embedder_id,
        })
    }

    #[must_use]
    pub fn with_auto_train(mut self, auto_train: bool) -> Self {
        self.auto_train = auto_train;
        self
    }

    pub fn spec(&self) -> &IndexSpec { &self.spec }

    pub fn topology(&self) -> Topology { self.spec.topology }

    pub fn index(&self) -> Option<&VectorIndex> { self.index.as_ref() }

    pub fn metadata(&self) -> &MetadataStore { &self.metadata }

    pub fn fingerprints(&self) -> &FingerprintSet { self.ingestor.fingerprints() }

    pub fn embedder_id(&self) -> Option<&str> { self.embedder_id.as_deref() }

    pub fn len(&self) -> usize { self.metadata.len() }

    pub fn is_empty(&self) -> bool { self.metadata.is_empty() }

    pub fn get(&self, offset: usize) -> Option<&Record> { self.metadata.get(offset) }

    pub fn is_trained(&self) -> bool { self.index.as_ref().is_some_and(VectorIndex::is_trained) }

    /// Deduplicate, embed and store `chunks`.
    ///
    /// Embedding failures and timeouts surface before anything is stored, so
    /// they are safe to retry.
    pub fn ingest(&mut self, chunks: Vec<Chunk>, embedder: &BatchEmbedder) -> Result<IngestReport> {
        check_metadata(&chunks)?;
        let submitted = chunks.len();
        let batch = self.ingestor.stage(chunks);
        if batch.is_empty() {
            return Ok(IngestReport { submitted, duplicates: batch.duplicates, ..IngestReport::default() });
        }
        let vectors = embedder.embed_all(&batch.texts())?;
        self.commit(batch, vectors, embedder.embedder_id(), submitted)
    }

    /// Store chunks whose vectors were computed elsewhere; `vectors[i]` belongs
    /// to `chunks[i]`.
    pub fn ingest_embedded(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, embedder_id: &str) -> Result<IngestReport> {
        if chunks.len() != vectors.len() {
            return Err(Error::Embedding(format!("{} vectors supplied for {} chunks", vectors.len(), chunks.len())));
        }
        check_metadata(&chunks)?;
        let submitted = chunks.len();
        let batch = self.ingestor.stage(chunks);
        if batch.is_empty() {
            return Ok(IngestReport { submitted, duplicates: batch.duplicates, ..IngestReport::default() });
        }
        let mut vectors: Vec<Option<Vec<f32>>> = vectors.into_iter().map(Some).collect();
        let accepted: Vec<Vec<f32>> = batch.positions.iter().filter_map(|&p| vectors[p].take()).collect();
        self.commit(batch, accepted, embedder_id, submitted)
    }

    fn commit(&mut self, batch: IngestBatch, vectors: Vec<Vec<f32>>, embedder_id: &str, submitted: usize) -> Result<IngestReport> {
        let dim = vectors.first().map_or(0, Vec::len);
        let (mut index, created) = match self.index.take() {
            Some(index) => (index, false),
            None => (VectorIndex::new(&self.spec, dim)?, true),
        };
        let was_trained = index.is_trained();
        match add_vectors(&mut index, &vectors, self.auto_train) {
            Ok(first) => {
                self.index = Some(index);
                for chunk in batch.chunks {
                    self.metadata.append(Record::from(chunk));
                }
                self.ingestor.commit(&batch.fingerprints);
                self.note_embedder(embedder_id);
                info!(accepted = vectors.len(), duplicates = batch.duplicates, total = self.len(), "ingested batch");
                Ok(IngestReport {
                    submitted,
                    accepted: vectors.len(),
                    duplicates: batch.duplicates,
                    first_offset: Some(first),
                    trained: !was_trained,
                })
            }
            Err(e) => {
                if !created {
                    self.index = Some(index);
                }
                Err(e)
            }
        }
    }

    /// Warn when `embedder_id` differs from the one the store was built with.
    ///
    /// Mixing embedders degrades relevance but is not an error.
    pub fn check_embedder(&self, embedder_id: &str) -> bool {
        match self.embedder_id.as_deref() {
            Some(known) if known != embedder_id => {
                warn!(stored = known, current = embedder_id, "store was built with a different embedder");
                false
            }
            _ => true,
        }
    }

    fn note_embedder(&mut self, embedder_id: &str) {
        if self.embedder_id.is_none() {
            self.embedder_id = Some(embedder_id.to_string());
        } else {
            self.check_embedder(embedder_id);
        }
    }

    /// Explicitly train an IVF index (creating it at the sample's dimension).
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let dim = vectors
            .first()
            .map(Vec::len)
            .ok_or(Error::InsufficientTrainingData { required: self.spec.n_list, provided: 0 })?;
        check_finite(vectors)?;
        let (mut index, created) = match self.index.take() {
            Some(index) => (index, false),
            None => (VectorIndex::new(&self.spec, dim)?, true),
        };
        let result = index.train(vectors);
        if result.is_ok() || !created {
            self.index = Some(index);
        }
        result
    }

    /// Rebuild every stored vector into a fresh index of `spec`'s topology.
    ///
    /// Vectors come from [`VectorIndex::reconstruct_all`], so rebuilding out of
    /// IVF-PQ carries its quantization error along. Offsets and metadata are
    /// unchanged; on failure the current index stays in place.
    pub fn rebuild(&mut self, spec: IndexSpec) -> Result<()> {
        let Some(current) = &self.index else {
            self.spec = spec;
            return Ok(());
        };
        let vectors = current.reconstruct_all();
        let mut fresh = VectorIndex::new(&spec, current.dim())?;
        if !vectors.is_empty() {
            fresh.train(&vectors)?;
            fresh.add(&vectors)?;
        }
        info!(from = %current.topology(), to = %spec.topology, vectors = vectors.len(), "rebuilt index");
        self.index = Some(fresh);
        self.spec = spec;
        Ok(())
    }

    pub fn describe(&self) -> StoreSummary {
        let ivf = self.index.as_ref().and_then(VectorIndex::ivf_spec).copied().or_else(|| {
            self.spec.topology.requires_training().then_some(self.spec)
        });
        StoreSummary {
            topology: self.index.as_ref().map_or(self.spec.topology, VectorIndex::topology),
            dimension: self.index.as_ref().map(VectorIndex::dim),
            vectors: self.index.as_ref().map_or(0, VectorIndex::len),
            records: self.metadata.len(),
            fingerprints: self.fingerprints().len(),
            trained: self.index.as_ref().map_or(!self.spec.topology.requires_training(), VectorIndex::is_trained),
            n_list: ivf.map(|s| s.n_list),
            n_probe: ivf.map(|s| s.n_probe),
            embedder_id: self.embedder_id.clone(),
        }
    }

    /// Nearest stored vectors to `query`. An empty store has no neighbors.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        match &self.index {
            Some(index) => index.search(query, k),
            None => Ok(Vec::new()),
        }
    }
}

/// Check, train if allowed and needed, then add. Leaves `index` untouched on error.
fn add_vectors(index: &mut VectorIndex, vectors: &[Vec<f32>], auto_train: bool) -> Result<usize> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != index.dim()) {
        return Err(Error::DimensionMismatch { expected: index.dim(), actual: bad.len() });
    }
    check_finite(vectors)?;
    if !index.is_trained() {
        let required = index.ivf_spec().map_or(0, |s| s.n_list);
        if !auto_train || vectors.len() < required {
            warn!(topology = %index.topology(), required, provided = vectors.len(), "index needs training before vectors can be added");
            return Err(Error::NotTrained(index.topology()));
        }
        index.train(vectors)?;
    }
    index.add(vectors)
}

fn check_finite(vectors: &[Vec<f32>]) -> Result<()> {
    match vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
        Some(i) => Err(Error::Embedding(format!("vector {i} has a non-finite component"))),
        None => Ok(()),
    }
}

/// Non-finite floats cannot be written to the metadata artifact.
fn check_metadata(chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        if let Some((key, value)) = chunk.meta.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidInput(format!("metadata '{key}' = {value} is not a finite number")));
        }
    }
    Ok(())
}
