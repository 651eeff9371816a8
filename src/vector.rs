//! Vector math for similarity scoring
//! Provides L2 normalization and dot product over f32 slices

use crate::{CacheError, Result};

/// L2 Normalization
/// norm_vec = vec / ||vec||
/// Empty and zero vectors cannot be normalized
pub fn l2_norm(vector: &[f32]) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(CacheError::Vector("cannot normalize an empty vector".to_string()));
    }

    let norm = vector.iter()
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();

    if norm == 0.0 || !norm.is_finite() {
        return Err(CacheError::Vector("cannot normalize a zero or non-finite vector".to_string()));
    }

    Ok(vector.iter().map(|x| x / norm).collect())
}

/// Dot Product
/// dot_prod = sum(a[i] * b[i]) for i = 0..a.len()
/// Both slices must have the same dimension
pub fn dot_product(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        return Err(CacheError::Dimension { expected: left.len(), got: right.len() });
    }

    Ok(left.iter()
        .zip(right.iter())
        .map(|(x, y)| x * y)
        .sum())
}
