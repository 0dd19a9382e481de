//! Lloyd's k-means over row-major `f32` buffers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::distance::nearest;

#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    pub k: usize,
    pub dim: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl KMeans {
    /// Train `k` centroids on `points` (`n x dim`, `n >= k >= 1`).
    ///
    /// Centroids start at a seeded random sample of distinct points; clusters
    /// that empty out are re-seeded from a random point so all `k` survive.
    pub fn train(&self, points: &[f32]) -> Vec<f32> {
        let n = points.len() / self.dim;
        debug_assert!(n >= self.k && self.k >= 1, "k-means needs n >= k >= 1 (n={n}, k={})", self.k);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut centroids = Vec::with_capacity(self.k * self.dim);
        for i in rand::seq::index::sample(&mut rng, n, self.k).iter() {
            centroids.extend_from_slice(row(points, self.dim, i));
        }

        let mut assign = vec![usize::MAX; n];
        for _ in 0..self.iterations.max(1) {
            let mut changed = false;
            for (i, slot) in assign.iter_mut().enumerate() {
                let (c, _) = nearest(&centroids, self.dim, row(points, self.dim, i));
                if *slot != c {
                    *slot = c;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![0f64; self.k * self.dim];
            let mut counts = vec![0usize; self.k];
            for (i, &c) in assign.iter().enumerate() {
                counts[c] += 1;
                for (s, x) in sums[c * self.dim..(c + 1) * self.dim].iter_mut().zip(row(points, self.dim, i)) {
                    *s += f64::from(*x);
                }
            }
            for c in 0..self.k {
                let dst = &mut centroids[c * self.dim..(c + 1) * self.dim];
                if counts[c] == 0 {
                    dst.copy_from_slice(row(points, self.dim, rng.gen_range(0..n)));
                    continue;
                }
                for (d, s) in dst.iter_mut().zip(&sums[c * self.dim..(c + 1) * self.dim]) {
                    *d = (*s / counts[c] as f64) as f32;
                }
            }
        }
        centroids
    }
}

#[inline]
pub fn row(buf: &[f32], dim: usize, i: usize) -> &[f32] { &buf[i * dim..(i + 1) * dim] }
