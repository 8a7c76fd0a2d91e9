//! Text-to-vector capability and its implementations.
//!
//! The backend is chosen once from [`ProviderConfig`] via [`from_config`];
//! the rest of the crate only sees `Arc<dyn EmbeddingProvider>`.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ProviderConfig;

pub mod lexical;
#[cfg(feature = "ml-features")]
pub mod onnx;

pub use lexical::LexicalEmbeddingProvider;
#[cfg(feature = "ml-features")]
pub use onnx::OnnxEmbeddingProvider;

/// Trait for computing text embeddings - allows for testing with mocks
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  /// Embed every text; `result[i]` belongs to `texts[i]`
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

  /// Pay the initialization cost up front
  async fn warm(&self) -> Result<()> {
    Ok(())
  }

  /// Model name recorded alongside cached embeddings
  fn label(&self) -> String;
}

/// Build the provider selected by configuration
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
  match config {
    ProviderConfig::Lexical { dimensions } => {
      Ok(Arc::new(LexicalEmbeddingProvider::new(*dimensions)))
    }
    #[cfg(feature = "ml-features")]
    ProviderConfig::Onnx { model, model_dir, max_tokens, batch_size } => {
      Ok(Arc::new(OnnxEmbeddingProvider::new(onnx::OnnxSettings {
        model: model.clone(),
        model_dir: model_dir.clone(),
        max_tokens: *max_tokens,
        batch_size: *batch_size,
      })))
    }
    #[cfg(not(feature = "ml-features"))]
    ProviderConfig::Onnx { .. } => Err(anyhow::anyhow!(
      "ONNX embeddings need the `ml-features` build feature; use the lexical provider instead"
    )),
  }
}

/// Normalize embedding vector to unit length for consistent similarity comparisons
pub fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

  // Zero vectors stay zero; ranking scores them at the floor.
  if magnitude < f32::EPSILON {
    return embedding;
  }

  for value in embedding.iter_mut() {
    *value /= magnitude;
  }
  embedding
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_unit_length() {
    let normalized = normalize(vec![3.0, 4.0]);
    assert!((normalized[0] - 0.6).abs() < 1e-6);
    assert!((normalized[1] - 0.8).abs() < 1e-6);
  }

  #[test]
  fn test_normalize_leaves_zero_vector() {
    assert_eq!(normalize(vec![0.0; 4]), vec![0.0; 4]);
  }

  #[test]
  fn test_from_config_builds_lexical() -> Result<()> {
    let provider = from_config(&ProviderConfig::Lexical { dimensions: 16 })?;
    assert_eq!(provider.label(), "lexical-16");
    Ok(())
  }
}
