//! Math utility functions

/// L2 normalize a vector in place, returning the original norm
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

/// Multiply a row vector by a row-major `rows x cols` matrix
pub fn vec_mat_mul(v: &[f32], matrix: &[f32], cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; cols];
    for (row, &scale) in matrix.chunks_exact(cols).zip(v) {
        for (acc, &m) in out.iter_mut().zip(row) {
            *acc += scale * m;
        }
    }
    out
}
