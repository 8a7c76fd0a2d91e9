use thiserror::Error;

/// Failures surfaced by [`crate::service::RecommendationService`].
///
/// An empty corpus is not represented here: it yields an empty result.
#[derive(Error, Debug)]
pub enum RecommendError {
  #[error("Query text is empty")]
  EmptyQuery,

  #[error("Song corpus unavailable ({source_name}): {message}")]
  CorpusUnavailable { source_name: String, message: String },

  #[error("Embedding model unavailable: {message}")]
  ModelUnavailable { message: String },
}

impl RecommendError {
  pub fn corpus_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self::CorpusUnavailable { source_name: source_name.into(), message: message.into() }
  }

  pub fn model_unavailable(message: impl Into<String>) -> Self {
    Self::ModelUnavailable { message: message.into() }
  }

  /// Stable tag for callers that branch on the failure kind
  pub fn kind(&self) -> &'static str {
    match self {
      Self::EmptyQuery => "empty_query",
      Self::CorpusUnavailable { .. } => "corpus_unavailable",
      Self::ModelUnavailable { .. } => "model_unavailable",
    }
  }
}
