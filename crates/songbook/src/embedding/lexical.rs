//! Deterministic lexical embedding.
//!
//! Feature hashing over lowercase word tokens: each token lands in one of
//! `dimensions` buckets with a hash-chosen sign, and the result is
//! L2-normalised. Not a neural model, but offline and stable, which makes it
//! the fallback backend and the reference provider in tests.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{normalize, EmbeddingProvider};

pub struct LexicalEmbeddingProvider {
  dimensions: usize,
}

impl LexicalEmbeddingProvider {
  pub fn new(dimensions: usize) -> Self {
    Self { dimensions: dimensions.max(1) }
  }

  pub fn dimensions(&self) -> usize {
    self.dimensions
  }

  /// Embed a single text; texts without word characters give a zero vector
  pub fn embed_text(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; self.dimensions];

    for token in tokenize(text) {
      let digest = Sha256::digest(token.as_bytes());

      let mut bucket_bytes = [0u8; 8];
      bucket_bytes.copy_from_slice(&digest[..8]);
      let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;

      let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
      vector[bucket] += sign;
    }

    normalize(vector)
  }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
  text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for LexicalEmbeddingProvider {
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    Ok(texts.iter().map(|text| self.embed_text(text)).collect())
  }

  fn label(&self) -> String {
    format!("lexical-{}", self.dimensions)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ranking::cosine_similarity;

  #[test]
  fn test_embedding_is_deterministic() {
    let provider = LexicalEmbeddingProvider::new(64);
    assert_eq!(provider.embed_text("Amazing grace"), provider.embed_text("Amazing grace"));
  }

  #[test]
  fn test_dimensions_are_respected() {
    let provider = LexicalEmbeddingProvider::new(13);
    assert_eq!(provider.embed_text("x").len(), 13);
    assert_eq!(LexicalEmbeddingProvider::new(0).dimensions(), 1);
  }

  #[test]
  fn test_case_and_punctuation_are_ignored() {
    let provider = LexicalEmbeddingProvider::new(64);
    assert_eq!(provider.embed_text("Grace, Amazing!"), provider.embed_text("grace amazing"));
  }

  #[test]
  fn test_non_ascii_words_are_tokens() {
    let provider = LexicalEmbeddingProvider::new(64);
    let vector = provider.embed_text("genade vir ewig ê");
    assert!(vector.iter().any(|v| *v != 0.0));
  }

  #[test]
  fn test_text_without_words_is_zero() {
    let provider = LexicalEmbeddingProvider::new(8);
    assert!(provider.embed_text(" ... ").iter().all(|v| *v == 0.0));
  }

  #[test]
  fn test_shared_words_score_higher() {
    let provider = LexicalEmbeddingProvider::new(256);
    let query = provider.embed_text("grace and amazing love");
    let close = provider.embed_text("grace amazing");
    let far = provider.embed_text("joy peace");

    assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
  }

  #[tokio::test]
  async fn test_batch_matches_single() -> Result<()> {
    let provider = LexicalEmbeddingProvider::new(32);
    let texts = vec!["one".to_string(), "two words".to_string()];

    let batch = provider.embed(&texts).await?;

    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1], provider.embed_text("two words"));
    Ok(())
  }
}
