//! Vector helpers for face embeddings.
//!
//! Embeddings arrive L2-normalized from the face oracle, so cosine
//! similarity reduces to a dot product everywhere in the pipeline.

use crate::shared::constants::{CENTROID_RETAIN_WEIGHT, CENTROID_SAMPLE_WEIGHT};

pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt()
}

/// Scales `v` to unit length in place. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    l2_normalize(&mut out);
    out
}

/// Dot product of L2-normalized vectors equals cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

/// Identity signature of one video: `normalize(start + mid + end)`.
pub fn video_descriptor(start: &[f32], mid: &[f32], end: &[f32]) -> Vec<f32> {
    let sum: Vec<f32> = start
        .iter()
        .zip(mid)
        .zip(end)
        .map(|((a, b), c)| a + b + c)
        .collect();
    normalized(&sum)
}

/// Moves a centroid toward a new sample: `normalize(0.9 * c + 0.1 * v)`.
pub fn blend_centroid(centroid: &[f32], sample: &[f32]) -> Vec<f32> {
    let blended: Vec<f32> = centroid
        .iter()
        .zip(sample)
        .map(|(c, v)| CENTROID_RETAIN_WEIGHT * c + CENTROID_SAMPLE_WEIGHT * v)
        .collect();
    normalized(&blended)
}
