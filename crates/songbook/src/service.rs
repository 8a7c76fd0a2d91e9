use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::config::Config;
use crate::corpus::{Corpus, CorpusId, CorpusStore, JsonCorpusStore};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::RecommendError;
use crate::preprocess;
use crate::ranking::{self, round_score};

pub const DEFAULT_TOP_K: usize = 5;

/// One recommended song with its full lyrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub filename: String,
  pub lyrics: Vec<String>,
  /// Cosine similarity, rounded to 3 decimals
  pub score: f32,
}

/// Corpus overview for status output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusSummary {
  pub songs: usize,
  pub embeddable: usize,
  pub corpus_id: String,
}

/// Entry point tying corpus loading, embedding cache and ranking together.
///
/// Build one per process and share it; the cache and provider inside are
/// what make repeated queries cheap.
pub struct RecommendationService {
  store: Arc<dyn CorpusStore>,
  provider: Arc<dyn EmbeddingProvider>,
  cache: EmbeddingCache,
  default_top_k: usize,
}

impl RecommendationService {
  pub fn new(
    store: Arc<dyn CorpusStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cache_capacity: usize,
  ) -> Self {
    let cache = EmbeddingCache::new(Arc::clone(&provider), cache_capacity);
    Self { store, provider, cache, default_top_k: DEFAULT_TOP_K }
  }

  /// Build the service described by `config`
  pub fn from_config(config: &Config) -> anyhow::Result<Self> {
    let provider = embedding::from_config(&config.provider)?;
    let store = Arc::new(JsonCorpusStore::new(&config.corpus_path));
    Ok(Self::new(store, provider, config.cache_capacity).with_default_top_k(config.top_k))
  }

  pub fn with_default_top_k(mut self, top_k: usize) -> Self {
    self.default_top_k = top_k;
    self
  }

  pub fn default_top_k(&self) -> usize {
    self.default_top_k
  }

  /// Songs whose lyrics are closest to `query`, best first
  pub async fn recommend(
    &self,
    query: &str,
    top_k: usize,
  ) -> Result<Vec<Recommendation>, RecommendError> {
    let query = query.trim();
    if query.is_empty() {
      return Err(RecommendError::EmptyQuery);
    }

    if top_k == 0 {
      return Ok(Vec::new());
    }

    let corpus = self.load_corpus().await?;
    let index = self.cache.get_or_compute(&corpus).await?;
    if index.is_empty() {
      bentley::verbose!("No embeddable songs in corpus {}", corpus.id().short());
      return Ok(Vec::new());
    }

    let query_vector = self.embed_query(query).await?;
    let ranked = ranking::rank(&query_vector, &index, top_k);
    bentley::debug!("Ranked {} songs against the query, keeping {}", index.len(), ranked.len());

    let recommendations = ranked
      .into_iter()
      .filter_map(|matched| {
        let record = corpus.get(index.sources[matched.index])?;
        Some(Recommendation {
          filename: record.filename.clone(),
          lyrics: record.lyrics.clone(),
          score: round_score(matched.score),
        })
      })
      .collect();

    Ok(recommendations)
  }

  /// [`Self::recommend`] with the configured song count
  pub async fn recommend_default(
    &self,
    query: &str,
  ) -> Result<Vec<Recommendation>, RecommendError> {
    self.recommend(query, self.default_top_k).await
  }

  /// Initialize the model and embed the current corpus; returns the number of embedded songs
  pub async fn warm(&self) -> Result<usize, RecommendError> {
    self.provider.warm().await.map_err(model_error)?;
    let corpus = self.load_corpus().await?;
    let index = self.cache.get_or_compute(&corpus).await?;
    Ok(index.len())
  }

  /// Forget cached embeddings for the current corpus
  pub async fn invalidate(&self) -> Result<bool, RecommendError> {
    let corpus = self.load_corpus().await?;
    Ok(self.cache.invalidate(&corpus.id()))
  }

  /// Number of records in the current corpus, embeddable or not
  pub async fn corpus_size(&self) -> Result<usize, RecommendError> {
    Ok(self.load_corpus().await?.len())
  }

  pub async fn summary(&self) -> Result<CorpusSummary, RecommendError> {
    let corpus = self.load_corpus().await?;
    Ok(CorpusSummary {
      songs: corpus.len(),
      embeddable: preprocess::prepare(&corpus).len(),
      corpus_id: corpus.id().to_string(),
    })
  }

  pub fn stats(&self) -> CacheStats {
    self.cache.stats()
  }

  pub fn is_cached(&self, id: &CorpusId) -> bool {
    self.cache.get(id).is_some()
  }

  async fn load_corpus(&self) -> Result<Corpus, RecommendError> {
    self
      .store
      .load()
      .await
      .map_err(|e| RecommendError::corpus_unavailable(self.store.describe(), format!("{e:#}")))
  }

  async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RecommendError> {
    let mut vectors = self.provider.embed(&[query.to_string()]).await.map_err(model_error)?;
    if vectors.is_empty() {
      return Err(RecommendError::model_unavailable("no embedding returned for query"));
    }
    Ok(vectors.swap_remove(0))
  }
}

fn model_error(error: anyhow::Error) -> RecommendError {
  RecommendError::model_unavailable(format!("{error:#}"))
}
