// Cosine scoring used for exact re-ranking of index candidates

/// Cosine distance in `[0, 2]`. Zero-norm inputs are treated as orthogonal.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot = x.mul_add(y, dot);
        norm_a = x.mul_add(x, norm_a);
        norm_b = y.mul_add(y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Similarity in `[0, 1]`: `1 - distance`, clamped to absorb rounding overshoot
/// and anti-correlated vectors.
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    similarity_from_distance(cosine_distance(a, b))
}
