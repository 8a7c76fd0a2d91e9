//! Corpus embedding cache.
//!
//! Each corpus identity owns one `OnceCell`. The first request for an
//! identity runs the batch embedding; concurrent requests for the same
//! identity wait on that cell instead of embedding again. A computation that
//! fails or is cancelled leaves the cell empty, so nothing partial is stored.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

use crate::corpus::{Corpus, CorpusId};
use crate::embedding::EmbeddingProvider;
use crate::error::RecommendError;
use crate::preprocess::{self, PreparedText};

/// Embeddings for one corpus snapshot; `vectors[i]` embeds `texts[i]`
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
  pub corpus_id: CorpusId,
  pub names: Vec<String>,
  pub texts: Vec<String>,
  pub sources: Vec<usize>,
  pub vectors: Vec<Vec<f32>>,
  pub model: String,
  pub computed_at: DateTime<Utc>,
}

impl EmbeddingIndex {
  fn new(corpus_id: CorpusId, prepared: PreparedText, vectors: Vec<Vec<f32>>, model: String) -> Self {
    Self {
      corpus_id,
      names: prepared.names,
      texts: prepared.texts,
      sources: prepared.sources,
      vectors,
      model,
      computed_at: Utc::now(),
    }
  }

  pub fn len(&self) -> usize {
    self.vectors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vectors.is_empty()
  }

  #[cfg(test)]
  pub(crate) fn for_tests(names: Vec<String>, vectors: Vec<Vec<f32>>) -> Self {
    let prepared = PreparedText {
      texts: names.clone(),
      sources: (0..names.len()).collect(),
      names,
    };
    Self::new(Corpus::default().id(), prepared, vectors, "test".to_string())
  }
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  /// Requests answered without starting a computation
  pub hits: u64,
  /// Requests that started a computation
  pub misses: u64,
  /// Batch embeddings that completed and were stored
  pub computations: u64,
  /// Identities currently holding a finished index
  pub entries: usize,
}

type Slot = Arc<OnceCell<Arc<EmbeddingIndex>>>;

#[derive(Default)]
struct Slots {
  by_id: HashMap<CorpusId, Slot>,
  order: VecDeque<CorpusId>,
}

pub struct EmbeddingCache {
  provider: Arc<dyn EmbeddingProvider>,
  capacity: usize,
  slots: Mutex<Slots>,
  hits: AtomicU64,
  misses: AtomicU64,
  computations: AtomicU64,
}

impl EmbeddingCache {
  /// `capacity` distinct corpora are kept; the oldest is evicted first
  pub fn new(provider: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
    Self {
      provider,
      capacity: capacity.max(1),
      slots: Mutex::new(Slots::default()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      computations: AtomicU64::new(0),
    }
  }

  /// Return the index for `corpus`, embedding it at most once per identity
  pub async fn get_or_compute(&self, corpus: &Corpus) -> Result<Arc<EmbeddingIndex>, RecommendError> {
    let id = corpus.id();
    let slot = self.slot(id);

    if let Some(index) = slot.get() {
      self.hits.fetch_add(1, Ordering::Relaxed);
      tracing::debug!(corpus = %id.short(), "embedding cache hit");
      return Ok(Arc::clone(index));
    }

    let started = AtomicBool::new(false);
    let started_ref = &started;
    let index = slot
      .get_or_try_init(|| async move {
        started_ref.store(true, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.compute(corpus).await.map(Arc::new)
      })
      .await?;

    if started.load(Ordering::Relaxed) {
      // Slots that were still computing when this one was created may now be evictable.
      evict_over_capacity(&mut self.lock(), self.capacity, &id);
    } else {
      // Another request computed it while we waited.
      self.hits.fetch_add(1, Ordering::Relaxed);
    }

    Ok(Arc::clone(index))
  }

  async fn compute(&self, corpus: &Corpus) -> Result<EmbeddingIndex, RecommendError> {
    let id = corpus.id();
    let prepared = preprocess::prepare(corpus);
    let model = self.provider.label();

    if prepared.is_empty() {
      tracing::debug!(corpus = %id.short(), "corpus has no embeddable songs");
      return Ok(EmbeddingIndex::new(id, prepared, Vec::new(), model));
    }

    bentley::info!("Embedding {} songs with {} (corpus {})", prepared.len(), model, id.short());

    let vectors = self
      .provider
      .embed(&prepared.texts)
      .await
      .map_err(|e| RecommendError::model_unavailable(format!("{e:#}")))?;

    if vectors.len() != prepared.len() {
      return Err(RecommendError::model_unavailable(format!(
        "model returned {} embeddings for {} songs",
        vectors.len(),
        prepared.len()
      )));
    }

    self.computations.fetch_add(1, Ordering::Relaxed);
    bentley::verbose!("Cached embeddings for corpus {}", id.short());

    Ok(EmbeddingIndex::new(id, prepared, vectors, model))
  }

  fn lock(&self) -> MutexGuard<'_, Slots> {
    // The map is never left half-updated, so a poisoned lock is still usable.
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn slot(&self, id: CorpusId) -> Slot {
    let mut slots = self.lock();

    if let Some(slot) = slots.by_id.get(&id) {
      return Arc::clone(slot);
    }

    let slot: Slot = Arc::new(OnceCell::new());
    slots.by_id.insert(id, Arc::clone(&slot));
    slots.order.push_back(id);
    evict_over_capacity(&mut slots, self.capacity, &id);

    slot
  }

  /// Finished index for `id`, if cached
  pub fn get(&self, id: &CorpusId) -> Option<Arc<EmbeddingIndex>> {
    self.lock().by_id.get(id).and_then(|slot| slot.get().cloned())
  }

  /// Drop the entry for `id`; returns whether one existed
  pub fn invalidate(&self, id: &CorpusId) -> bool {
    let mut slots = self.lock();
    slots.order.retain(|existing| existing != id);
    slots.by_id.remove(id).is_some()
  }

  pub fn clear(&self) {
    let mut slots = self.lock();
    slots.by_id.clear();
    slots.order.clear();
  }

  pub fn stats(&self) -> CacheStats {
    let entries = self.lock().by_id.values().filter(|slot| slot.initialized()).count();
    CacheStats {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      computations: self.computations.load(Ordering::Relaxed),
      entries,
    }
  }
}

/// Drop the oldest settled slots until `capacity` fits, never touching `keep`.
///
/// A slot is settled once it holds an index, or when no request holds a
/// handle to it (its computation failed or was cancelled). Slots still being
/// computed stay, so the cache may briefly run over capacity.
fn evict_over_capacity(slots: &mut Slots, capacity: usize, keep: &CorpusId) {
  let mut position = 0;
  while slots.order.len() > capacity && position < slots.order.len() {
    let id = slots.order[position];
    let settled = id != *keep
      && slots.by_id.get(&id).map_or(true, |slot| slot.initialized() || Arc::strong_count(slot) == 1);

    if settled {
      slots.order.remove(position);
      slots.by_id.remove(&id);
      tracing::debug!(corpus = %id.short(), "evicted corpus embeddings");
    } else {
      position += 1;
    }
  }
}
