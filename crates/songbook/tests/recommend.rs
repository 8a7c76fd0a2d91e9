use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use songbook::{
  Corpus, CorpusStore, EmbeddingProvider, InMemoryCorpusStore, LexicalEmbeddingProvider, RecommendError,
  RecommendationService, SongRecord,
};

/// Lexical provider that records how it was called
struct Recording {
  inner: LexicalEmbeddingProvider,
  calls: AtomicUsize,
  texts: AtomicUsize,
  largest_batch: AtomicUsize,
}

impl Recording {
  fn new() -> Self {
    Self {
      inner: LexicalEmbeddingProvider::new(256),
      calls: AtomicUsize::new(0),
      texts: AtomicUsize::new(0),
      largest_batch: AtomicUsize::new(0),
    }
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl EmbeddingProvider for Recording {
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.texts.fetch_add(texts.len(), Ordering::SeqCst);
    self.largest_batch.fetch_max(texts.len(), Ordering::SeqCst);
    tokio::task::yield_now().await;
    self.inner.embed(texts).await
  }

  fn label(&self) -> String {
    "recording".to_string()
  }
}

struct Broken;

#[async_trait]
impl EmbeddingProvider for Broken {
  async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
    Err(anyhow!("model weights missing"))
  }

  fn label(&self) -> String {
    "broken".to_string()
  }
}

fn song(name: &str, lyrics: &[&str]) -> SongRecord {
  SongRecord::new(name, lyrics.iter().map(|s| s.to_string()).collect())
}

fn hymnal() -> Corpus {
  Corpus::new(vec![
    song("song1", &["grace", "amazing"]),
    song("song2", &["joy", "peace"]),
    song("song3", &[]),
  ])
}

fn service(corpus: Corpus, provider: Arc<dyn EmbeddingProvider>) -> RecommendationService {
  RecommendationService::new(Arc::new(InMemoryCorpusStore::new(corpus)), provider, 1)
}

#[tokio::test]
async fn test_songs_without_lyrics_are_never_recommended() -> Result<()> {
  let service = service(hymnal(), Arc::new(Recording::new()));

  let results = service.recommend("grace and amazing love", 2).await?;

  assert!(results.len() <= 2);
  assert_eq!(results[0].filename, "song1");
  assert!(results.iter().all(|r| r.filename != "song3"));

  let everything = service.recommend("grace and amazing love", 10).await?;
  assert_eq!(everything.len(), 2);
  assert!(everything.iter().all(|r| r.filename != "song3"));
  Ok(())
}

#[tokio::test]
async fn test_empty_query_makes_no_provider_call() {
  let provider = Arc::new(Recording::new());
  let service = service(hymnal(), provider.clone());

  for query in ["", "   ", "\n\t"] {
    let error = service.recommend(query, 5).await.unwrap_err();
    assert!(matches!(error, RecommendError::EmptyQuery));
  }
  assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_corpus_without_lyrics_gives_empty_result() -> Result<()> {
  let corpus = Corpus::new(vec![song("a", &[]), song("b", &["   ", ""])]);
  let service = service(corpus, Arc::new(Recording::new()));

  assert!(service.recommend("grace", 5).await?.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_zero_top_k_is_always_empty() -> Result<()> {
  let provider = Arc::new(Recording::new());
  let service = service(hymnal(), provider.clone());

  assert!(service.recommend("grace", 0).await?.is_empty());
  assert_eq!(provider.calls(), 0);
  Ok(())
}

#[tokio::test]
async fn test_results_are_bounded_and_sorted() -> Result<()> {
  let corpus = Corpus::new(vec![
    song("a", &["the lord is my shepherd"]),
    song("b", &["i shall not want"]),
    song("c", &["he makes me lie down in green pastures"]),
    song("d", &["he leads me beside still waters"]),
    song("e", &["he restores my soul"]),
  ]);
  let service = service(corpus, Arc::new(Recording::new()));

  for top_k in 1..=7 {
    let results = service.recommend("the lord restores my soul beside still waters", top_k).await?;
    assert_eq!(results.len(), top_k.min(5));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
  }
  Ok(())
}

#[tokio::test]
async fn test_corpus_is_embedded_once_across_queries() -> Result<()> {
  let provider = Arc::new(Recording::new());
  let service = service(hymnal(), provider.clone());

  service.recommend("grace", 2).await?;
  service.recommend("peace", 2).await?;
  service.recommend("joy", 2).await?;

  // One corpus batch plus one call per query
  assert_eq!(provider.calls(), 4);
  assert_eq!(provider.largest_batch.load(Ordering::SeqCst), 2);
  assert_eq!(provider.texts.load(Ordering::SeqCst), 2 + 3);

  let stats = service.stats();
  assert_eq!(stats.computations, 1);
  assert_eq!(stats.misses, 1);
  assert_eq!(stats.hits, 2);
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_queries_share_one_computation() -> Result<()> {
  let provider = Arc::new(Recording::new());
  let service = Arc::new(service(hymnal(), provider.clone()));

  let handles: Vec<_> = (0..16)
    .map(|i| {
      let service = Arc::clone(&service);
      tokio::spawn(async move {
        let query = if i % 2 == 0 { "amazing grace" } else { "joy and peace" };
        service.recommend(query, 2).await
      })
    })
    .collect();

  for result in futures::future::join_all(handles).await {
    let recommendations = result??;
    assert_eq!(recommendations.len(), 2);
  }

  assert_eq!(service.stats().computations, 1);
  // Sixteen query embeddings on top of the single corpus batch
  assert_eq!(provider.calls(), 17);
  Ok(())
}

#[tokio::test]
async fn test_identical_queries_give_identical_results() -> Result<()> {
  let service = service(hymnal(), Arc::new(Recording::new()));

  let first = service.recommend("grace and amazing love", 3).await?;
  let second = service.recommend("  grace and amazing love\n", 3).await?;

  assert_eq!(first, second);
  Ok(())
}

/// Store whose corpus can be replaced between loads
struct Swappable {
  corpus: Mutex<Corpus>,
}

#[async_trait]
impl CorpusStore for Swappable {
  async fn load(&self) -> Result<Corpus> {
    Ok(self.corpus.lock().map_err(|_| anyhow!("poisoned"))?.clone())
  }

  fn describe(&self) -> String {
    "swappable".to_string()
  }
}

#[tokio::test]
async fn test_changed_corpus_is_reembedded() -> Result<()> {
  let provider = Arc::new(Recording::new());
  let store = Arc::new(Swappable { corpus: Mutex::new(hymnal()) });
  let service = RecommendationService::new(store.clone(), provider.clone(), 1);

  assert_eq!(service.recommend("grace", 5).await?.len(), 2);

  let mut records = hymnal().records().to_vec();
  records.push(song("song4", &["grace upon grace"]));
  *store.corpus.lock().map_err(|_| anyhow!("poisoned"))? = Corpus::new(records);

  let results = service.recommend("grace", 5).await?;

  assert_eq!(results.len(), 3);
  assert_eq!(service.stats().computations, 2);
  Ok(())
}

#[tokio::test]
async fn test_provider_failure_is_model_unavailable() {
  let service = service(hymnal(), Arc::new(Broken));

  let error = service.recommend("grace", 2).await.unwrap_err();

  assert_eq!(error.kind(), "model_unavailable");
  assert!(error.to_string().contains("model weights missing"));
}

#[tokio::test]
async fn test_warm_reports_embedded_songs() -> Result<()> {
  let provider = Arc::new(Recording::new());
  let service = service(hymnal(), provider.clone());

  assert_eq!(service.warm().await?, 2);
  service.recommend("grace", 1).await?;

  assert_eq!(provider.calls(), 2);
  Ok(())
}
