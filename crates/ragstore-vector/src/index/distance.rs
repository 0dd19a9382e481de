/// Squared Euclidean distance.
#[inline]
pub fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Index and squared distance of the centroid closest to `x`.
///
/// `centroids` is a row-major `k x dim` buffer with `k >= 1`.
pub fn nearest(centroids: &[f32], dim: usize, x: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, c) in centroids.chunks_exact(dim).enumerate() {
        let d = l2_sq(c, x);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert!((l2_sq(&[1.0, 0.0], &[0.0, 1.0]) - 2.0).abs() < 1e-6);
        assert!((inner_product(&[1.0, 2.0], &[3.0, 4.0]) - 11.0).abs() < 1e-6);
        let centroids = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(nearest(&centroids, 2, &[9.0, 8.0]).0, 1);
        assert_eq!(nearest(&centroids, 2, &[1.0, -1.0]).0, 0);
    }
}
