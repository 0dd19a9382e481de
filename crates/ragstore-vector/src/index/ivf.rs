//! Inverted-file indexes: a k-means coarse quantizer splits the space into
//! `n_list` cells and queries only scan the `n_probe` cells closest to them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstore_core::error::{Error, Result};
use ragstore_core::types::{Metric, Topology};

use super::distance::{l2_sq, nearest};
use super::kmeans::{row, KMeans};
use super::{rank, IndexSpec, Neighbor};

/// Trained cell centroids (`n_list x dim`, row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarseQuantizer {
    dim: usize,
    centroids: Vec<f32>,
}

impl CoarseQuantizer {
    pub fn train(spec: &IndexSpec, dim: usize, rows: &[f32]) -> Result<Self> {
        let provided = rows.len() / dim;
        if provided < spec.n_list {
            return Err(Error::InsufficientTrainingData { required: spec.n_list, provided });
        }
        let km = KMeans { k: spec.n_list, dim, iterations: spec.train_iterations, seed: spec.seed };
        Ok(Self { dim, centroids: km.train(rows) })
    }

    pub fn n_list(&self) -> usize { self.centroids.len() / self.dim }

    pub fn assign(&self, x: &[f32]) -> usize { nearest(&self.centroids, self.dim, x).0 }

    pub fn centroid(&self, cell: usize) -> &[f32] { row(&self.centroids, self.dim, cell) }

    /// The `n_probe` cells nearest to `q`, closest first.
    pub fn probe(&self, q: &[f32], n_probe: usize) -> Vec<usize> {
        let mut cells: Vec<(usize, f32)> =
            self.centroids.chunks_exact(self.dim).map(|c| l2_sq(c, q)).enumerate().collect();
        cells.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        cells.into_iter().take(n_probe.max(1)).map(|(c, _)| c).collect()
    }

    pub(crate) fn is_consistent(&self, dim: usize) -> bool {
        self.dim == dim && dim > 0 && !self.centroids.is_empty() && self.centroids.len() % dim == 0
    }
}

/// Offsets per cell, in insertion order.
pub(crate) type InvertedLists = Vec<Vec<usize>>;

/// Every offset in `0..len` appears in exactly one of `n_list` lists.
pub(crate) fn lists_are_consistent(lists: &InvertedLists, n_list: usize, len: usize) -> bool {
    if lists.len() != n_list {
        return false;
    }
    let mut seen = vec![false; len];
    for &offset in lists.iter().flatten() {
        match seen.get_mut(offset) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    seen.into_iter().all(|s| s)
}

/// IVF with uncompressed vectors stored by offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfFlatIndex {
    spec: IndexSpec,
    dim: usize,
    quantizer: Option<CoarseQuantizer>,
    lists: InvertedLists,
    data: Vec<f32>,
}

impl IvfFlatIndex {
    pub fn new(spec: IndexSpec, dim: usize) -> Self {
        Self { spec, dim, quantizer: None, lists: Vec::new(), data: Vec::new() }
    }

    pub fn spec(&self) -> &IndexSpec { &self.spec }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.data.len() / self.dim }

    pub fn is_trained(&self) -> bool { self.quantizer.is_some() }

    pub fn train(&mut self, rows: &[f32]) -> Result<()> {
        if self.len() > 0 {
            return Err(Error::InvalidConfig("cannot retrain an index that already holds vectors".into()));
        }
        let quantizer = CoarseQuantizer::train(&self.spec, self.dim, rows)?;
        self.lists = vec![Vec::new(); quantizer.n_list()];
        self.quantizer = Some(quantizer);
        Ok(())
    }

    pub fn add(&mut self, rows: &[f32]) -> Result<()> {
        let quantizer = self.quantizer.as_ref().ok_or(Error::NotTrained(Topology::IvfFlat))?;
        let start = self.len();
        for (i, v) in rows.chunks_exact(self.dim).enumerate() {
            self.lists[quantizer.assign(v)].push(start + i);
        }
        self.data.extend_from_slice(rows);
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let quantizer = self.quantizer.as_ref().ok_or(Error::NotTrained(Topology::IvfFlat))?;
        let cells = quantizer.probe(query, self.spec.n_probe);
        let mut candidates = Vec::new();
        for &cell in &cells {
            for &offset in &self.lists[cell] {
                candidates.push(Neighbor { offset, distance: l2_sq(query, row(&self.data, self.dim, offset)) });
            }
        }
        debug!(probed = cells.len(), candidates = candidates.len(), "ivfflat probe");
        Ok(rank(candidates, Metric::L2, k))
    }

    pub fn vectors(&self) -> &[f32] { &self.data }

    pub(crate) fn is_consistent(&self) -> bool {
        if self.dim == 0 || self.data.len() % self.dim != 0 {
            return false;
        }
        match &self.quantizer {
            None => self.data.is_empty(),
            Some(q) => q.is_consistent(self.dim) && lists_are_consistent(&self.lists, q.n_list(), self.len()),
        }
    }
}
