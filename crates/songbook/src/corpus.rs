//! Song corpus model and the stores that load it.
//!
//! A [`Corpus`] is an immutable snapshot. Its [`CorpusId`] is derived from
//! content only, so two loads of the same file share cached embeddings.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const UNKNOWN_FILENAME: &str = "Unknown";

/// One song as produced by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
  pub filename: String,
  pub lyrics: Vec<String>,
}

impl SongRecord {
  pub fn new(filename: impl Into<String>, lyrics: Vec<String>) -> Self {
    Self { filename: filename.into(), lyrics }
  }

  /// Lenient conversion from a raw JSON record.
  ///
  /// A missing or non-string `filename` becomes "Unknown"; non-string lyric
  /// lines are skipped. Records that end up without lyrics are dropped later
  /// by preprocessing rather than failing the whole corpus.
  pub fn from_value(value: &Value) -> Self {
    let filename = value
      .get("filename")
      .and_then(Value::as_str)
      .unwrap_or(UNKNOWN_FILENAME)
      .to_string();

    let lyrics = value
      .get("lyrics")
      .and_then(Value::as_array)
      .map(|lines| lines.iter().filter_map(Value::as_str).map(str::to_string).collect())
      .unwrap_or_default();

    Self { filename, lyrics }
  }
}

/// Content-derived corpus identity (SHA-256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorpusId([u8; 32]);

impl CorpusId {
  pub fn of(records: &[SongRecord]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());

    // Length prefixes keep ["ab", "c"] and ["a", "bc"] apart.
    for record in records {
      hash_str(&mut hasher, &record.filename);
      hasher.update((record.lyrics.len() as u64).to_le_bytes());
      for line in &record.lyrics {
        hash_str(&mut hasher, line);
      }
    }

    Self(hasher.finalize().into())
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }

  /// First 12 hex characters, for log lines
  pub fn short(&self) -> String {
    self.to_string()[..12].to_string()
  }
}

fn hash_str(hasher: &mut Sha256, value: &str) {
  hasher.update((value.len() as u64).to_le_bytes());
  hasher.update(value.as_bytes());
}

impl fmt::Display for CorpusId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in self.0 {
      write!(f, "{byte:02x}")?;
    }
    Ok(())
  }
}

/// Immutable, cheaply clonable snapshot of the song collection
#[derive(Debug, Clone)]
pub struct Corpus {
  records: Arc<[SongRecord]>,
  id: CorpusId,
}

impl Corpus {
  pub fn new(records: Vec<SongRecord>) -> Self {
    let id = CorpusId::of(&records);
    Self { records: records.into(), id }
  }

  pub fn id(&self) -> CorpusId {
    self.id
  }

  pub fn records(&self) -> &[SongRecord] {
    &self.records
  }

  pub fn get(&self, index: usize) -> Option<&SongRecord> {
    self.records.get(index)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl Default for Corpus {
  fn default() -> Self {
    Self::new(Vec::new())
  }
}

impl FromIterator<SongRecord> for Corpus {
  fn from_iter<I: IntoIterator<Item = SongRecord>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

/// Parse a corpus document: a JSON array of `{filename, lyrics}` records
pub fn parse_corpus(content: &str) -> Result<Corpus> {
  let document: Value = serde_json::from_str(content).context("Corpus is not valid JSON")?;

  let entries = document
    .as_array()
    .ok_or_else(|| anyhow!("Corpus must be a JSON array of song records"))?;

  Ok(entries.iter().map(SongRecord::from_value).collect())
}

/// Source of the current corpus snapshot
#[async_trait]
pub trait CorpusStore: Send + Sync {
  /// Load the full corpus atomically
  async fn load(&self) -> Result<Corpus>;

  /// Where the corpus comes from, for error messages
  fn describe(&self) -> String;
}

/// Reads the combined songs JSON file on every load
pub struct JsonCorpusStore {
  path: PathBuf,
}

impl JsonCorpusStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl CorpusStore for JsonCorpusStore {
  async fn load(&self) -> Result<Corpus> {
    let content = tokio::fs::read_to_string(&self.path)
      .await
      .with_context(|| format!("Failed to read corpus file {}", self.path.display()))?;

    let corpus = parse_corpus(&content)
      .with_context(|| format!("Failed to parse corpus file {}", self.path.display()))?;

    bentley::verbose!("Loaded {} songs from {}", corpus.len(), self.path.display());
    Ok(corpus)
  }

  fn describe(&self) -> String {
    self.path.display().to_string()
  }
}

/// Serves a fixed corpus held in memory
pub struct InMemoryCorpusStore {
  corpus: Corpus,
}

impl InMemoryCorpusStore {
  pub fn new(corpus: Corpus) -> Self {
    Self { corpus }
  }
}

#[async_trait]
impl CorpusStore for InMemoryCorpusStore {
  async fn load(&self) -> Result<Corpus> {
    Ok(self.corpus.clone())
  }

  fn describe(&self) -> String {
    "in-memory corpus".to_string()
  }
}
