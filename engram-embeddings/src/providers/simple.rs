//! Deterministic hash-projection fallback.
//!
//! No network, no model files: text becomes a bag of tokens and
//! overlapping bigrams projected into D dimensions through four
//! independent hash seeds; image bytes become a mixture of SHA-256 bins,
//! a length feature, and a byte-value histogram. Always available, and
//! stable across processes.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use engram_core::errors::EngramResult;

use crate::provider::EmbeddingProvider;

/// Four independent FNV offset bases; one projection per seed spreads
/// collisions across the vector.
const HASH_SEEDS: [u64; 4] = [
    0xcbf2_9ce4_8422_2325,
    0x9ae1_6a3b_2f90_404f,
    0x5bd1_e995_7b93_fca1,
    0x27d4_eb2f_1656_67c5,
];

/// Deterministic fallback embedding provider.
pub struct SimpleProvider {
    dimensions: usize,
}

impl SimpleProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// FNV-1a over `term`, starting from `seed`.
    fn hash_term(term: &str, seed: u64) -> u64 {
        let mut h = seed;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100_0000_01b3);
        }
        h
    }

    /// Tokenize: CJK characters stand alone; ASCII is lowercased and
    /// split on anything non-alphanumeric.
    fn tokenize(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            if is_cjk(c) {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            } else if c.is_ascii_alphanumeric() {
                current.push(c.to_ascii_lowercase());
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    /// Bag of tokens plus overlapping bigrams, projected through each
    /// hash seed, then L2-normalized. Empty text yields a zero vector.
    pub fn text_vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vec;
        }

        // Unigrams carry full weight; order-sensitive bigrams half, so
        // reordered phrasings of the same words stay close.
        let mut features: Vec<(String, f32)> = tokens.iter().map(|t| (t.clone(), 1.0)).collect();
        for pair in tokens.windows(2) {
            features.push((format!("{}{}", pair[0], pair[1]), 0.5));
        }

        for (feature, weight) in &features {
            for seed in HASH_SEEDS {
                let h = Self::hash_term(feature, seed);
                let bucket = (h as usize) % self.dimensions;
                // Hash-derived sign keeps the projection roughly centered.
                let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
                vec[bucket] += sign * weight;
            }
        }

        normalize(&mut vec);
        vec
    }

    /// Image-byte fallback: SHA-256 digest bins + length feature +
    /// byte-value histogram, folded into D and normalized.
    pub fn image_vector(&self, bytes: &[u8]) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimensions];
        if bytes.is_empty() {
            return vec;
        }

        let digest = Sha256::digest(bytes);
        for (i, b) in digest.iter().enumerate() {
            vec[i % self.dimensions] += f32::from(*b) / 255.0;
        }

        let mut histogram = [0u32; 256];
        for b in bytes {
            histogram[*b as usize] += 1;
        }
        let total = bytes.len() as f32;
        for (value, count) in histogram.iter().enumerate() {
            if *count > 0 {
                vec[value % self.dimensions] += *count as f32 / total;
            }
        }

        let len_bucket = self.dimensions.saturating_sub(1);
        vec[len_bucket] += (bytes.len() as f32 + 1.0).ln();

        normalize(&mut vec);
        vec
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF
        | 0x3040..=0x30FF | 0xAC00..=0xD7AF
    )
}

fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SimpleProvider {
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        Ok(self.text_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> EngramResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.text_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "simple-hash"
    }

    fn provider_id(&self) -> &str {
        "simple"
    }
}
