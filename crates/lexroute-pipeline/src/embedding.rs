//! A dependency-free embedder based on feature hashing.
//!
//! Each lower-cased alphanumeric token is hashed (FNV-1a) into one of
//! `dimensions` buckets with a hash-derived sign, and the result is
//! L2-normalised. Texts sharing vocabulary land close together, which is all
//! the semantic index needs when no embedding service is configured.

use lexroute_core::capability::{CapabilityError, Embedder};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
  dimensions: usize,
}

impl HashingEmbedder {
  pub fn new(dimensions: usize) -> Self { Self { dimensions: dimensions.max(1) } }

  pub fn embed_one(&self, text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; self.dimensions];
    for token in tokens(text) {
      let h = fnv1a(token.as_bytes());
      let bucket = (h % self.dimensions as u64) as usize;
      let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
      v[bucket] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
      v.iter_mut().for_each(|x| *x /= norm);
    }
    v
  }
}

impl Default for HashingEmbedder {
  fn default() -> Self { Self::new(384) }
}

impl Embedder for HashingEmbedder {
  fn dimensions(&self) -> usize { self.dimensions }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
    Ok(texts.iter().map(|t| self.embed_one(t)).collect())
  }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| t.chars().count() > 1)
    .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
  bytes
    .iter()
    .fold(FNV_OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[cfg(test)]
mod tests {
  use lexroute_core::store::cosine_distance;

  use super::*;

  #[test]
  fn vectors_are_unit_length() {
    let v = HashingEmbedder::new(64).embed_one("Tachograph rules for heavy trucks");
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
  }

  #[test]
  fn shared_vocabulary_is_closer() {
    let e = HashingEmbedder::new(256);
    let doc = e.embed_one("Cabotage restrictions in France tighten for foreign hauliers");
    let near = e.embed_one("France cabotage restrictions");
    let far = e.embed_one("Refrigerated transport temperature logging");
    assert!(cosine_distance(&doc, &near) < cosine_distance(&doc, &far));
  }

  #[tokio::test]
  async fn embed_preserves_order_and_dimensions() {
    let e = HashingEmbedder::new(32);
    let out = e.embed(&["a b".into(), "alpha beta".into()]).await.unwrap();
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|v| v.len() == 32));
    assert_eq!(out[1], e.embed_one("alpha beta"));
  }
}
