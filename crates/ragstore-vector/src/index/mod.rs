//! Vector storage and nearest-neighbor search over one of four topologies.
//!
//! | topology  | search               | training | distance                  |
//! |-----------|----------------------|----------|---------------------------|
//! | `flatl2`  | exact, brute force   | no       | squared L2, ascending     |
//! | `flatip`  | exact, brute force   | no       | inner product, descending |
//! | `ivfflat` | `n_probe` of `n_list` cells | yes | squared L2, ascending |
//! | `ivfpq`   | `n_probe` cells, PQ codes   | yes | approx. squared L2     |
//!
//! The topology is fixed at construction. Offsets are dense, start at zero and
//! follow insertion order.

pub mod distance;
pub mod flat;
pub mod ivf;
pub mod kmeans;
pub mod params;
pub mod pq;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ragstore_core::config::{default_n_probe, IndexConfig};
use ragstore_core::error::{Error, Result};
use ragstore_core::types::{Metric, Topology};

use flat::FlatIndex;
use ivf::IvfFlatIndex;
use params::IvfParams;
use pq::IvfPqIndex;

/// Construction parameters. IVF fields are ignored by flat topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub topology: Topology,
    pub n_list: usize,
    pub n_probe: usize,
    pub pq_m: usize,
    pub pq_nbits: usize,
    pub train_iterations: usize,
    pub seed: u64,
}

impl IndexSpec {
    pub fn new(topology: Topology) -> Self {
        Self::from_config(&IndexConfig { topology, ..IndexConfig::default() })
    }

    pub fn from_config(cfg: &IndexConfig) -> Self {
        Self {
            topology: cfg.topology,
            n_list: cfg.n_list,
            n_probe: cfg.effective_n_probe(),
            pq_m: cfg.pq_m,
            pq_nbits: cfg.pq_nbits,
            train_iterations: cfg.train_iterations,
            seed: cfg.seed,
        }
    }

    #[must_use]
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Apply suggested IVF sizing; `n_probe` follows the new `n_list`.
    #[must_use]
    pub fn with_params(mut self, params: IvfParams) -> Self {
        self.n_list = params.n_list;
        self.n_probe = default_n_probe(params.n_list);
        self.pq_m = params.pq_m;
        self.pq_nbits = params.pq_nbits;
        self
    }

    fn check(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(Error::InvalidConfig("vector dimension must be at least 1".into()));
        }
        if !self.topology.requires_training() {
            return Ok(());
        }
        if self.n_list == 0 || self.n_probe == 0 {
            return Err(Error::InvalidConfig(format!("n_list ({}) and n_probe ({}) must be at least 1", self.n_list, self.n_probe)));
        }
        if self.topology == Topology::IvfPq {
            if self.pq_m == 0 || dim % self.pq_m != 0 {
                return Err(Error::InvalidConfig(format!("pq_m ({}) must divide the dimension ({dim})", self.pq_m)));
            }
            if !(1..=8).contains(&self.pq_nbits) {
                return Err(Error::InvalidConfig(format!("pq_nbits must be in 1..=8, got {}", self.pq_nbits)));
            }
        }
        Ok(())
    }
}

/// One search hit: the vector's offset and its topology-native distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub offset: usize,
    pub distance: f32,
}

/// Best `k` candidates, best first; ties go to the lower offset.
pub(crate) fn rank(mut candidates: Vec<Neighbor>, metric: Metric, k: usize) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }
    let order = |a: &Neighbor, b: &Neighbor| {
        let by_distance =
            if metric.higher_is_better() { b.distance.total_cmp(&a.distance) } else { a.distance.total_cmp(&b.distance) };
        by_distance.then(a.offset.cmp(&b.offset))
    };
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, order);
        candidates.truncate(k);
    }
    candidates.sort_by(order);
    candidates
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topology", rename_all = "lowercase")]
pub enum VectorIndex {
    FlatL2(FlatIndex),
    FlatIp(FlatIndex),
    IvfFlat(IvfFlatIndex),
    IvfPq(IvfPqIndex),
}

impl VectorIndex {
    pub fn new(spec: &IndexSpec, dim: usize) -> Result<Self> {
        spec.check(dim)?;
        if spec.topology.requires_training() && spec.n_probe > spec.n_list {
            warn!(n_probe = spec.n_probe, n_list = spec.n_list, "n_probe exceeds n_list; every cell will be scanned");
        }
        let index = match spec.topology {
            Topology::FlatL2 => Self::FlatL2(FlatIndex::new(dim)),
            Topology::FlatIp => {
                debug!("flatip ranks by raw inner product; normalize vectors for cosine similarity");
                Self::FlatIp(FlatIndex::new(dim))
            }
            Topology::IvfFlat => Self::IvfFlat(IvfFlatIndex::new(*spec, dim)),
            Topology::IvfPq => Self::IvfPq(IvfPqIndex::new(*spec, dim)),
        };
        info!(topology = %spec.topology, dim, "created index");
        Ok(index)
    }

    pub fn topology(&self) -> Topology {
        match self {
            Self::FlatL2(_) => Topology::FlatL2,
            Self::FlatIp(_) => Topology::FlatIp,
            Self::IvfFlat(_) => Topology::IvfFlat,
            Self::IvfPq(_) => Topology::IvfPq,
        }
    }

    pub fn metric(&self) -> Metric { self.topology().metric() }

    pub fn dim(&self) -> usize {
        match self {
            Self::FlatL2(i) | Self::FlatIp(i) => i.dim(),
            Self::IvfFlat(i) => i.dim(),
            Self::IvfPq(i) => i.dim(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::FlatL2(i) | Self::FlatIp(i) => i.len(),
            Self::IvfFlat(i) => i.len(),
            Self::IvfPq(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Flat topologies are always ready.
    pub fn is_trained(&self) -> bool {
        match self {
            Self::FlatL2(_) | Self::FlatIp(_) => true,
            Self::IvfFlat(i) => i.is_trained(),
            Self::IvfPq(i) => i.is_trained(),
        }
    }

    /// IVF construction parameters, `None` for flat topologies.
    pub fn ivf_spec(&self) -> Option<&IndexSpec> {
        match self {
            Self::FlatL2(_) | Self::FlatIp(_) => None,
            Self::IvfFlat(i) => Some(i.spec()),
            Self::IvfPq(i) => Some(i.spec()),
        }
    }

    /// Learn IVF cells (and PQ codebooks) from at least `n_list` vectors.
    ///
    /// A no-op for flat topologies. Fails without changing the index when the
    /// sample is too small or the index already holds vectors.
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let rows = self.flatten(vectors)?;
        match self {
            Self::FlatL2(_) | Self::FlatIp(_) => return Ok(()),
            Self::IvfFlat(i) => i.train(&rows)?,
            Self::IvfPq(i) => i.train(&rows)?,
        }
        info!(topology = %self.topology(), vectors = vectors.len(), "trained index");
        Ok(())
    }

    /// Append vectors and return the offset of the first one.
    ///
    /// Every vector is checked before any is stored, so a failing call leaves
    /// the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<usize> {
        let start = self.len();
        let rows = self.flatten(vectors)?;
        match self {
            Self::FlatL2(i) | Self::FlatIp(i) => i.add(&rows),
            Self::IvfFlat(i) => i.add(&rows)?,
            Self::IvfPq(i) => i.add(&rows)?,
        }
        Ok(start)
    }

    /// Up to `k` nearest neighbors, best first.
    ///
    /// IVF topologies only scan the probed cells, so fewer than `k` hits is a
    /// normal outcome.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim() {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: query.len() });
        }
        match self {
            Self::FlatL2(i) | Self::FlatIp(i) => Ok(i.search(self.metric(), query, k)),
            Self::IvfFlat(i) => i.search(query, k),
            Self::IvfPq(i) => i.search(query, k),
        }
    }

    /// Every stored vector by offset; PQ returns decoded approximations.
    pub fn reconstruct_all(&self) -> Vec<Vec<f32>> {
        let dim = self.dim();
        let rows = match self {
            Self::FlatL2(i) | Self::FlatIp(i) => i.vectors().to_vec(),
            Self::IvfFlat(i) => i.vectors().to_vec(),
            Self::IvfPq(i) => i.reconstruct(),
        };
        rows.chunks_exact(dim).map(<[f32]>::to_vec).collect()
    }

    /// Structural check used after deserialization.
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Self::FlatL2(i) | Self::FlatIp(i) => i.is_consistent(),
            Self::IvfFlat(i) => i.is_consistent(),
            Self::IvfPq(i) => i.is_consistent(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::CorruptState(format!("{} index structure is inconsistent", self.topology())))
        }
    }

    fn flatten(&self, vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
        let dim = self.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        Ok(vectors.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(offset: usize, distance: f32) -> Neighbor { Neighbor { offset, distance } }

    #[test]
    fn rank_orders_by_metric_then_offset() {
        let hits = vec![n(3, 1.0), n(0, 2.0), n(2, 1.0), n(1, 0.5)];
        let l2: Vec<usize> = rank(hits.clone(), Metric::L2, 3).iter().map(|h| h.offset).collect();
        assert_eq!(l2, vec![1, 2, 3]);
        let ip: Vec<usize> = rank(hits.clone(), Metric::InnerProduct, 2).iter().map(|h| h.offset).collect();
        assert_eq!(ip, vec![0, 2]);
        assert!(rank(hits, Metric::L2, 0).is_empty());
    }

    #[test]
    fn construction_validates_parameters() {
        assert!(matches!(VectorIndex::new(&IndexSpec::new(Topology::FlatL2), 0), Err(Error::InvalidConfig(_))));
        let spec = IndexSpec { pq_m: 3, ..IndexSpec::new(Topology::IvfPq) };
        assert!(matches!(VectorIndex::new(&spec, 8), Err(Error::InvalidConfig(_))));
        let spec = IndexSpec { pq_m: 4, pq_nbits: 9, ..IndexSpec::new(Topology::IvfPq) };
        assert!(VectorIndex::new(&spec, 8).is_err());
        // PQ sizing is irrelevant to flat topologies
        assert!(VectorIndex::new(&IndexSpec { pq_m: 3, ..IndexSpec::new(Topology::FlatIp) }, 8).is_ok());
    }

    #[test]
    fn dimension_mismatch_leaves_index_unchanged() {
        let mut index = VectorIndex::new(&IndexSpec::new(Topology::FlatL2), 2).unwrap();
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let err = index.add(&[vec![0.0, 1.0], vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.len(), 1);
        assert!(matches!(index.search(&[1.0], 1), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn add_returns_starting_offset() {
        let mut index = VectorIndex::new(&IndexSpec::new(Topology::FlatIp), 2).unwrap();
        assert_eq!(index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(), 0);
        assert_eq!(index.add(&[vec![0.6, 0.8]]).unwrap(), 2);
        assert_eq!(index.reconstruct_all()[2], vec![0.6, 0.8]);
    }

    #[test]
    fn serialized_form_carries_the_topology_tag() {
        let index = VectorIndex::new(&IndexSpec::new(Topology::IvfFlat), 4).unwrap();
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["topology"], "ivfflat");
        let back: VectorIndex = serde_json::from_value(json).unwrap();
        assert_eq!(back, index);
        back.validate().unwrap();
    }
}
