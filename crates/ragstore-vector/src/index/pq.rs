//! Product quantization of IVF residuals.
//!
//! Each `dim`-vector is cut into `m` sub-vectors of `dim / m` components and
//! every sub-vector is replaced by the id of its nearest codeword in a
//! per-slice codebook. Search uses asymmetric distance: the query residual
//! stays exact and only the stored side is quantized.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstore_core::error::{Error, Result};
use ragstore_core::types::{Metric, Topology};

use super::distance::{l2_sq, nearest};
use super::ivf::{lists_are_consistent, CoarseQuantizer, InvertedLists};
use super::kmeans::{row, KMeans};
use super::{rank, IndexSpec, Neighbor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dim: usize,
    m: usize,
    /// Codewords per slice: `min(2^nbits, training rows)`.
    ksub: usize,
    /// `m x ksub x dsub`, row-major.
    codebooks: Vec<f32>,
}

impl ProductQuantizer {
    pub fn train(spec: &IndexSpec, dim: usize, rows: &[f32]) -> Self {
        let n = rows.len() / dim;
        let dsub = dim / spec.pq_m;
        let ksub = (1usize << spec.pq_nbits).min(n).max(1);
        let mut codebooks = Vec::with_capacity(spec.pq_m * ksub * dsub);
        for j in 0..spec.pq_m {
            let slice: Vec<f32> = rows.chunks_exact(dim).flat_map(|v| v[j * dsub..(j + 1) * dsub].iter().copied()).collect();
            let km = KMeans { k: ksub, dim: dsub, iterations: spec.train_iterations, seed: spec.seed.wrapping_add(j as u64 + 1) };
            codebooks.extend(km.train(&slice));
        }
        Self { dim, m: spec.pq_m, ksub, codebooks }
    }

    fn dsub(&self) -> usize { self.dim / self.m }

    fn codebook(&self, j: usize) -> &[f32] {
        let size = self.ksub * self.dsub();
        &self.codebooks[j * size..(j + 1) * size]
    }

    pub fn encode(&self, x: &[f32]) -> Vec<u8> {
        let dsub = self.dsub();
        (0..self.m).map(|j| nearest(self.codebook(j), dsub, &x[j * dsub..(j + 1) * dsub]).0 as u8).collect()
    }

    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let dsub = self.dsub();
        let mut out = Vec::with_capacity(self.dim);
        for (j, &c) in codes.iter().enumerate() {
            out.extend_from_slice(row(self.codebook(j), dsub, c as usize));
        }
        out
    }

    /// Squared distance from each slice of `q` to each codeword (`m x ksub`).
    pub fn distance_table(&self, q: &[f32]) -> Vec<f32> {
        let dsub = self.dsub();
        let mut table = Vec::with_capacity(self.m * self.ksub);
        for j in 0..self.m {
            let qs = &q[j * dsub..(j + 1) * dsub];
            table.extend(self.codebook(j).chunks_exact(dsub).map(|c| l2_sq(qs, c)));
        }
        table
    }

    pub fn adc(&self, table: &[f32], codes: &[u8]) -> f32 {
        codes.iter().enumerate().map(|(j, &c)| table[j * self.ksub + c as usize]).sum()
    }

    fn is_consistent(&self, dim: usize) -> bool {
        self.dim == dim
            && self.m > 0
            && dim % self.m == 0
            && (1..=256).contains(&self.ksub)
            && self.codebooks.len() == self.m * self.ksub * self.dsub()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Trained {
    quantizer: CoarseQuantizer,
    pq: ProductQuantizer,
}

/// IVF cells holding PQ codes of each vector's residual to its cell centroid.
///
/// Vectors are not kept; [`IvfPqIndex::reconstruct`] returns the decoded
/// approximation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfPqIndex {
    spec: IndexSpec,
    dim: usize,
    trained: Option<Trained>,
    lists: InvertedLists,
    /// `m` bytes per vector, by offset.
    codes: Vec<u8>,
}

impl IvfPqIndex {
    pub fn new(spec: IndexSpec, dim: usize) -> Self {
        Self { spec, dim, trained: None, lists: Vec::new(), codes: Vec::new() }
    }

    pub fn spec(&self) -> &IndexSpec { &self.spec }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.codes.len() / self.spec.pq_m }

    pub fn is_trained(&self) -> bool { self.trained.is_some() }

    pub fn train(&mut self, rows: &[f32]) -> Result<()> {
        if self.len() > 0 {
            return Err(Error::InvalidConfig("cannot retrain an index that already holds vectors".into()));
        }
        let quantizer = CoarseQuantizer::train(&self.spec, self.dim, rows)?;
        let mut residuals = Vec::with_capacity(rows.len());
        for v in rows.chunks_exact(self.dim) {
            let c = quantizer.centroid(quantizer.assign(v));
            residuals.extend(v.iter().zip(c).map(|(x, y)| x - y));
        }
        let pq = ProductQuantizer::train(&self.spec, self.dim, &residuals);
        debug!(n_list = quantizer.n_list(), m = self.spec.pq_m, ksub = pq.ksub, "trained ivfpq");
        self.lists = vec![Vec::new(); quantizer.n_list()];
        self.trained = Some(Trained { quantizer, pq });
        Ok(())
    }

    pub fn add(&mut self, rows: &[f32]) -> Result<()> {
        let t = self.trained.as_ref().ok_or(Error::NotTrained(Topology::IvfPq))?;
        let start = self.len();
        let mut residual = vec![0f32; self.dim];
        for (i, v) in rows.chunks_exact(self.dim).enumerate() {
            let cell = t.quantizer.assign(v);
            for ((r, x), c) in residual.iter_mut().zip(v).zip(t.quantizer.centroid(cell)) {
                *r = x - c;
            }
            self.codes.extend(t.pq.encode(&residual));
            self.lists[cell].push(start + i);
        }
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let t = self.trained.as_ref().ok_or(Error::NotTrained(Topology::IvfPq))?;
        let cells = t.quantizer.probe(query, self.spec.n_probe);
        let m = self.spec.pq_m;
        let mut candidates = Vec::new();
        for &cell in &cells {
            let residual: Vec<f32> = query.iter().zip(t.quantizer.centroid(cell)).map(|(x, c)| x - c).collect();
            let table = t.pq.distance_table(&residual);
            for &offset in &self.lists[cell] {
                let distance = t.pq.adc(&table, &self.codes[offset * m..(offset + 1) * m]);
                candidates.push(Neighbor { offset, distance });
            }
        }
        debug!(probed = cells.len(), candidates = candidates.len(), "ivfpq probe");
        Ok(rank(candidates, Metric::L2, k))
    }

    /// Decoded approximation of every stored vector, by offset.
    pub fn reconstruct(&self) -> Vec<f32> {
        let Some(t) = &self.trained else {
            return Vec::new();
        };
        let m = self.spec.pq_m;
        let mut out = vec![0f32; self.len() * self.dim];
        for (cell, offsets) in self.lists.iter().enumerate() {
            let centroid = t.quantizer.centroid(cell);
            for &offset in offsets {
                let decoded = t.pq.decode(&self.codes[offset * m..(offset + 1) * m]);
                let dst = &mut out[offset * self.dim..(offset + 1) * self.dim];
                for ((d, r), c) in dst.iter_mut().zip(&decoded).zip(centroid) {
                    *d = r + c;
                }
            }
        }
        out
    }

    pub(crate) fn is_consistent(&self) -> bool {
        if self.dim == 0 || self.spec.pq_m == 0 || self.codes.len() % self.spec.pq_m != 0 {
            return false;
        }
        match &self.trained {
            None => self.codes.is_empty(),
            Some(t) => {
                t.quantizer.is_consistent(self.dim)
                    && t.pq.is_consistent(self.dim)
                    && t.pq.m == self.spec.pq_m
                    && self.codes.iter().all(|&c| (c as usize) < t.pq.ksub)
                    && lists_are_consistent(&self.lists, t.quantizer.n_list(), self.len())
            }
        }
    }
}
