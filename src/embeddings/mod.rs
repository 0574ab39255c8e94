#[cfg(test)]
mod tests;

pub mod gemini;

pub use gemini::{EmbeddingTask, GeminiClient};

/// The sentinel vector recorded when an item in a batch fails to embed.
/// Zero vectors must never reach the index; the sync engine filters them out.
#[inline]
pub fn zero_vector(dimension: u32) -> Vec<f32> {
    vec![0.0; dimension as usize]
}

#[inline]
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|component| *component == 0.0)
}
