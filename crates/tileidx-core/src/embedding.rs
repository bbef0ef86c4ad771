//! Deterministic pure-function embedding primitive shared by the worker
//! (tile embeddings) and the retriever (query-text embeddings). Real models
//! are out of scope; this exists so upsert/search can be exercised without
//! any model weights while still behaving like a proper embedder: same
//! input always yields the same unit-norm vector, different inputs differ.

use sha2::{Digest, Sha256};

pub const EMBEDDING_DIM: usize = 32;

/// Map a seed string (image identity, query text, ...) to a unit-norm
/// vector of `EMBEDDING_DIM` floats. Each dimension is a byte of
/// `SHA-256(seed || dim_index)`, rescaled to `[-1, 1]`.
pub fn embed_seed(seed: &str) -> Vec<f32> {
    let mut out = vec![0f32; EMBEDDING_DIM];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update((i as u32).to_le_bytes());
        let digest = hasher.finalize();
        *slot = (digest[0] as f32 / 127.5) - 1.0;
    }
    normalize(&mut out);
    out
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_unit_norm() {
        let v = embed_seed("clip:vit-l:tile:1");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn same_seed_is_deterministic() {
        assert_eq!(embed_seed("a"), embed_seed("a"));
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(embed_seed("a"), embed_seed("b"));
    }
}
