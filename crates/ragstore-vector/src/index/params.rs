/// IVF-PQ sizing for a corpus of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfParams {
    pub n_list: usize,
    pub pq_m: usize,
    pub pq_nbits: usize,
}

impl IvfParams {
    /// `n_list ≈ 2·√total` (never more cells than vectors) and the largest
    /// sub-vector count up to 16 (32 for `dim >= 1024`) that divides `dim`.
    pub fn suggest(total: usize, dim: usize) -> Self {
        let sqrt_n = (total as f64).sqrt() as usize;
        let n_list = (2 * sqrt_n).clamp(1, total.max(1));
        let cap = if dim >= 1024 { 32 } else { 16 };
        let pq_m = (1..=cap.min(dim.max(1))).rev().find(|m| dim % m == 0).unwrap_or(1);
        Self { n_list, pq_m, pq_nbits: 8 }
    }
}
