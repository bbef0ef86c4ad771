//! Pure-function embedder stand-in. Real models (CLIP, SigLIP2, PE-core,
//! ...) are out of scope; embedding is delegated to the shared deterministic
//! primitive so worker-written and retriever-queried vectors line up.

use tileidx_core::embed_seed;

pub use tileidx_core::EMBEDDING_DIM;

/// A decoded tile, standing in for an RGB image. Loading never touches a
/// real pixel buffer; the deterministic seed is derived from the tile's
/// identity so the same tile always embeds to the same vector.
#[derive(Debug, Clone)]
pub struct TileImage {
    pub tile_id: String,
    pub width: i32,
    pub height: i32,
}

pub fn embed_one(image: &TileImage, embedder_backend: &str, embedder_model: &str) -> Vec<f32> {
    embed_seed(&format!("{embedder_backend}:{embedder_model}:{}", image.tile_id))
}

pub fn embed_batch(images: &[TileImage], embedder_backend: &str, embedder_model: &str) -> Vec<Vec<f32>> {
    images.iter().map(|img| embed_one(img, embedder_backend, embedder_model)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_unit_norm() {
        let img = TileImage { tile_id: "tile:1".to_string(), width: 512, height: 512 };
        let v = embed_one(&img, "clip", "vit-l");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn same_tile_embeds_deterministically() {
        let img = TileImage { tile_id: "tile:7".to_string(), width: 256, height: 256 };
        let a = embed_one(&img, "clip", "vit-l");
        let b = embed_one(&img, "clip", "vit-l");
        assert_eq!(a, b);
    }

    #[test]
    fn different_backends_embed_differently() {
        let img = TileImage { tile_id: "tile:7".to_string(), width: 256, height: 256 };
        let a = embed_one(&img, "clip", "vit-l");
        let b = embed_one(&img, "siglip2", "so400m");
        assert_ne!(a, b);
    }
}
