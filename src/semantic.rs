//! Offline embedding backend: hashed word and bigram features projected into
//! a fixed-width, L2-normalized vector. Deterministic and dependency-free, so
//! SEMANTIC fields can be scored without a model server.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::compare::backend::EmbeddingBackend;
use crate::compare::text::normalize_whitespace;
use crate::error::BackendError;

pub const LOCAL_HASH_BACKEND: &str = "local-hash";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone)]
pub struct HashedEmbeddingBackend {
    dimensions: usize,
}

impl HashedEmbeddingBackend {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }
}

impl Default for HashedEmbeddingBackend {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl EmbeddingBackend for HashedEmbeddingBackend {
    fn name(&self) -> &str {
        LOCAL_HASH_BACKEND
    }

    fn embed_similarity(&self, left: &str, right: &str) -> Result<f64, BackendError> {
        let left_features = tokenize_payload(left);
        let right_features = tokenize_payload(right);
        if left_features == right_features {
            return Ok(1.0);
        }
        if left_features.is_empty() || right_features.is_empty() {
            return Ok(0.0);
        }

        let left_vector = embed_features(left_features, self.dimensions);
        let right_vector = embed_features(right_features, self.dimensions);
        Ok(cosine_similarity(&left_vector, &right_vector).clamp(0.0, 1.0))
    }
}

fn embed_features(features: Vec<String>, dims: usize) -> Vec<f32> {
    let mut vector = vec![0_f32; dims];
    for feature in features {
        let hash = stable_hash(&feature);
        let index = (hash as usize) % dims;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    left.iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| f64::from(*left_value) * f64::from(*right_value))
        .sum::<f64>()
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let words = normalize_whitespace(payload)
        .split(' ')
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}
