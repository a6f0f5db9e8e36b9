//! Text embedding contract and the always-available hashed embedder.

/// Produces fixed-dimension, L2-normalised vectors for text.
pub trait TextEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Deterministic term-frequency embedder.
///
/// Terms are hashed (FNV-1a) into `dim` buckets and weighted by frequency,
/// with a mild length bonus so that short function words count for less.
/// Not semantic, but stable across runs and machines, which is what the
/// in-memory index and the tests need.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIM: usize = 384;

    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(term: &str, dim: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dim as u64) as usize
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let terms: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return v;
        }
        let total = terms.len() as f32;
        for term in &terms {
            let weight = (1.0 + (term.len() as f32).ln()) / total;
            v[Self::bucket(term, self.dim)] += weight;
        }
        normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl TextEmbedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// L2-normalise a vector in place.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0 when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbedder::new(64);
        let v = e.embed("").unwrap();
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn vectors_are_unit_length_and_deterministic() {
        let e = HashEmbedder::default();
        let a = e.embed("Annual leave entitlement for employees").unwrap();
        let b = e.embed("Annual leave entitlement for employees").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let e = HashEmbedder::default();
        let leave = e.embed("employee annual leave days").unwrap();
        let leave2 = e.embed("annual leave for an employee").unwrap();
        let data = e.embed("personal data breach notification").unwrap();
        assert!(cosine_similarity(&leave, &leave2) > cosine_similarity(&leave, &data));
    }

    #[test]
    fn batch_matches_single() {
        let e = HashEmbedder::new(32);
        let batch = e.embed_batch(&["one two", "three four"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], e.embed("three four").unwrap());
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
