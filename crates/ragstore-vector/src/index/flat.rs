use serde::{Deserialize, Serialize};

use ragstore_core::types::Metric;

use super::distance::{inner_product, l2_sq};
use super::{rank, Neighbor};

/// Brute-force storage: every vector is scored against every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self { Self { dim, data: Vec::new() } }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.data.len() / self.dim }

    /// Append a row-major buffer of already validated vectors.
    pub fn add(&mut self, rows: &[f32]) { self.data.extend_from_slice(rows); }

    pub fn search(&self, metric: Metric, query: &[f32], k: usize) -> Vec<Neighbor> {
        let candidates = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(offset, v)| Neighbor {
                offset,
                distance: match metric {
                    Metric::L2 => l2_sq(query, v),
                    Metric::InnerProduct => inner_product(query, v),
                },
            })
            .collect();
        rank(candidates, metric, k)
    }

    pub fn vectors(&self) -> &[f32] { &self.data }

    pub(crate) fn is_consistent(&self) -> bool { self.dim > 0 && self.data.len() % self.dim == 0 }
}
